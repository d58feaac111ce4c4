use std::{path::PathBuf, rc::Rc};

use crate::{
    assets::RenderAssetSink,
    clock::FrameClock,
    foundation::task::FrameTaskQueue,
    media::{
        audio::AudioAdapter, decode::FrameDecoder, probe::DurationProbe, track::AssetEmitter,
        video::VideoAdapter,
    },
};

/// Everything a media adapter needs from its surroundings.
///
/// One context is shared by all adapters of a render; the view creates adapters through
/// [`MediaContext::create_audio`] and [`MediaContext::create_video`].
#[derive(Clone)]
pub struct MediaContext {
    /// Shared frame clock.
    pub clock: Rc<dyn FrameClock>,
    /// Host asset pipeline.
    pub sink: Rc<dyn RenderAssetSink>,
    /// Suppress all asset emission and frame decoding.
    pub dry_run: bool,
    /// Per-frame work awaited by the frame driver.
    pub frame_tasks: FrameTaskQueue,
    /// Duration probe used on load.
    pub probe: Rc<dyn DurationProbe>,
    /// Video frame decoder; `None` skips image decoding entirely.
    pub decoder: Option<Rc<dyn FrameDecoder>>,
    /// Base for relative media locators.
    pub assets_root: Option<PathBuf>,
}

impl MediaContext {
    /// Create an unloaded audio adapter.
    pub fn create_audio(&self) -> AudioAdapter {
        AudioAdapter::new(self.clone())
    }

    /// Create an unloaded video adapter.
    pub fn create_video(&self) -> VideoAdapter {
        VideoAdapter::new(self.clone())
    }

    pub(crate) fn emitter(&self) -> AssetEmitter {
        AssetEmitter::new(self.sink.clone(), self.dry_run)
    }
}

impl std::fmt::Debug for MediaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaContext")
            .field("frame", &self.clock.frame())
            .field("fps", &self.clock.fps())
            .field("dry_run", &self.dry_run)
            .field("frame_tasks", &self.frame_tasks)
            .field("has_decoder", &self.decoder.is_some())
            .field("assets_root", &self.assets_root)
            .finish()
    }
}
