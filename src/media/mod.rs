//! Media adapters: time-bounded audio/video resources exposed as element objects.
//!
//! An adapter owns a [`PlaybackWindow`], composites its property inputs into the values it
//! emits, and keeps exactly one up-to-date registration in the host asset pipeline while the
//! resource is playing.
//!
//! Lifecycle: `unloaded -> loaded -> attached (per-frame updates) -> detached`, or
//! `attached -> snapped` when playback is cut short.

pub(crate) mod audio;
pub(crate) mod context;
pub(crate) mod decode;
pub(crate) mod probe;
pub(crate) mod property;
pub(crate) mod signal;
pub(crate) mod track;
pub(crate) mod video;
pub(crate) mod window;

use futures::future::LocalBoxFuture;

use crate::{foundation::error::VnmarkResult, media::property::PropertyValue};

pub use window::PlaybackWindow;

/// Element-object capability implemented by the media adapters and driven by the view.
pub trait MediaObject {
    /// Locator passed to [`MediaObject::load`], if loaded.
    fn url(&self) -> Option<String>;

    /// Fix the resource and probe its duration. Allowed once per object.
    fn load(&self, url: &str) -> LocalBoxFuture<'_, VnmarkResult<()>>;

    /// Start playback at the current frame and follow the clock.
    fn attach(&self) -> VnmarkResult<()>;

    /// Stop playback, stop following the clock and withdraw the registration.
    fn detach(&self);

    /// Whether the resource is audible/visible at the current frame.
    fn is_playing(&self) -> bool;

    /// Future settling when a one-shot resource finishes; already settled for looping or
    /// finished resources.
    fn create_playback_promise(&self) -> LocalBoxFuture<'static, ()>;

    /// Cut playback short. Terminal.
    fn snap_playback(&self);

    /// Read a property by name.
    fn get_property(&self, name: &str) -> VnmarkResult<PropertyValue>;

    /// Write a property by name.
    fn set_property(&self, name: &str, value: PropertyValue) -> VnmarkResult<()>;
}
