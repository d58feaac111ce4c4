//! Deterministic, frame-stepped rendering of branching visual-novel scenes.
//!
//! A [`FrameDriver`] advances a script [`Engine`] and its [`View`] one frame at a time on a
//! [`FrameClock`]. Media the view plays is represented by [`AudioAdapter`] and [`VideoAdapter`],
//! which translate their playback window into [`RenderAsset`] registrations for the host
//! pipeline. [`RenderSession`] ties these together per composition render; [`cue`] provides a
//! small JSON scene format that exercises the whole stack.
#![forbid(unsafe_code)]

pub mod assets;
pub mod clock;
pub mod cue;
pub mod driver;
pub mod engine;
pub mod session;

mod foundation;
mod media;

pub use assets::{
    AssetKind, AssetSpan, FrameAssetLog, FrameAssets, RenderAsset, RenderAssetManager,
    RenderAssetSink, absolute_src,
};
pub use clock::{CallbackOwner, FrameCallback, FrameClock, SteppedClock};
pub use cue::{CuePlayer, CueSceneFactory, CueSheet, CueStep};
pub use driver::FrameDriver;
pub use engine::{
    ChoiceSelector, Engine, EngineState, EngineStatus, LoadingFuture, View, ViewStatus,
};
pub use foundation::core::{Fps, FrameIndex};
pub use foundation::error::{VnmarkError, VnmarkResult};
pub use foundation::task::{FrameTask, FrameTaskQueue, YieldNow, yield_now};
pub use media::audio::AudioAdapter;
pub use media::context::MediaContext;
pub use media::decode::{DecodedFrame, FfmpegFrameDecoder, FrameDecoder};
pub use media::probe::{DurationProbe, FfprobeDurationProbe, StaticDurationProbe};
pub use media::property::{AudioProperty, PropertyValue, VideoProperty};
pub use media::signal::Composite;
pub use media::video::VideoAdapter;
pub use media::{MediaObject, PlaybackWindow};
pub use session::{
    CompositionMetadata, MediaServices, RenderProps, RenderSession, Scene, SceneFactory,
    calculate_metadata,
};
