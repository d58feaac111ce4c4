use std::{cell::RefCell, rc::Rc};

use futures::{FutureExt as _, future::LocalBoxFuture};
use tracing::debug;

use crate::{
    assets::AssetKind,
    clock::CallbackOwner,
    foundation::error::{VnmarkError, VnmarkResult},
    media::{
        MediaObject,
        context::MediaContext,
        property::{AudioProperty, PropertyValue},
        signal::Composite,
        track::{AssetEmitter, MediaTrack, check_duration},
        window::PlaybackWindow,
    },
};

#[derive(Debug)]
struct AudioState {
    track: MediaTrack,
    value_volume: f64,
    property_volume: f64,
    volume: Composite,
}

/// Audio element backed by a host audio asset.
///
/// Emits `value * volume` as the asset volume.
pub struct AudioAdapter {
    ctx: MediaContext,
    emitter: AssetEmitter,
    owner: CallbackOwner,
    state: Rc<RefCell<AudioState>>,
}

impl AudioAdapter {
    pub(crate) fn new(ctx: MediaContext) -> Self {
        let emitter = ctx.emitter();
        Self {
            ctx,
            emitter,
            owner: CallbackOwner::allocate(),
            state: Rc::new(RefCell::new(AudioState {
                track: MediaTrack::new(AssetKind::Audio),
                value_volume: 1.0,
                property_volume: 1.0,
                volume: Composite::default(),
            })),
        }
    }

    /// Id used for host registrations (empty until loaded).
    pub fn asset_id(&self) -> String {
        self.state.borrow().track.asset_id().to_string()
    }

    /// Composite volume currently emitted.
    pub fn volume(&self) -> f64 {
        self.state.borrow().volume.get()
    }

    /// Snapshot of the playback window.
    pub fn window(&self) -> PlaybackWindow {
        self.state.borrow().track.window
    }

    fn update_volume(&self) {
        let mut st = self.state.borrow_mut();
        let inputs = [st.value_volume, st.property_volume];
        if st.volume.update(&inputs) && st.track.window.start_frame().is_some() {
            let volume = st.volume.get();
            st.track
                .refresh(&self.emitter, self.ctx.clock.frame(), volume, None);
        }
    }
}

impl std::fmt::Debug for AudioAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioAdapter")
            .field("owner", &self.owner)
            .field("state", &self.state.borrow())
            .finish()
    }
}

impl MediaObject for AudioAdapter {
    fn url(&self) -> Option<String> {
        self.state.borrow().track.url().map(str::to_string)
    }

    fn load(&self, url: &str) -> LocalBoxFuture<'_, VnmarkResult<()>> {
        let url = url.to_string();
        async move {
            let src = self.state.borrow_mut().track.begin_load(
                &url,
                self.ctx.clock.frame(),
                self.ctx.assets_root.as_deref(),
            )?;
            let secs = self.ctx.probe.probe_duration_secs(&src).await?;
            check_duration(&src, secs)?;
            let mut st = self.state.borrow_mut();
            st.track.window.set_duration(secs, self.ctx.clock.fps());
            debug!(
                src = %src,
                secs,
                frames = st.track.window.duration_frames(),
                "audio loaded"
            );
            Ok::<_, VnmarkError>(())
        }
        .boxed_local()
    }

    fn attach(&self) -> VnmarkResult<()> {
        let frame = self.ctx.clock.frame();
        {
            let mut st = self.state.borrow_mut();
            if !st.track.is_loaded() {
                return Err(VnmarkError::contract(
                    "cannot attach an audio object before it is loaded",
                ));
            }
            st.track.window.start(frame);
            let volume = st.volume.get();
            st.track.register(&self.emitter, frame, volume, None);
        }

        let state = self.state.clone();
        let emitter = self.emitter.clone();
        self.ctx.clock.add_frame_callback(
            self.owner,
            Box::new(move |frame| {
                let st = state.borrow();
                st.track.refresh(&emitter, frame, st.volume.get(), None);
            }),
        );
        debug!(id = %self.asset_id(), frame = frame.0, "audio attached");
        Ok(())
    }

    fn detach(&self) {
        let mut st = self.state.borrow_mut();
        st.track.window.stop();
        self.ctx.clock.remove_frame_callback(self.owner);
        self.emitter.unregister(st.track.asset_id());
        debug!(id = %st.track.asset_id(), "audio detached");
    }

    fn is_playing(&self) -> bool {
        self.state
            .borrow()
            .track
            .window
            .is_playing(self.ctx.clock.frame())
    }

    fn create_playback_promise(&self) -> LocalBoxFuture<'static, ()> {
        let window = self.window();
        if window.looping() || !window.is_playing(self.ctx.clock.frame()) {
            return futures::future::ready(()).boxed_local();
        }
        self.ctx.clock.create_timeout(window.duration_millis())
    }

    fn snap_playback(&self) {
        let mut st = self.state.borrow_mut();
        st.track.window.stop();
        self.ctx.clock.remove_frame_callback(self.owner);
        self.emitter.unregister(st.track.asset_id());
        debug!(id = %st.track.asset_id(), "audio snapped");
    }

    fn get_property(&self, name: &str) -> VnmarkResult<PropertyValue> {
        let st = self.state.borrow();
        Ok(match name.parse::<AudioProperty>()? {
            AudioProperty::Value => PropertyValue::Number(st.value_volume),
            AudioProperty::Volume => PropertyValue::Number(st.property_volume),
            AudioProperty::Loop => PropertyValue::Bool(st.track.window.looping()),
        })
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> VnmarkResult<()> {
        match name.parse::<AudioProperty>()? {
            AudioProperty::Value => {
                self.state.borrow_mut().value_volume = value.as_number(name)?;
                self.update_volume();
            }
            AudioProperty::Volume => {
                self.state.borrow_mut().property_volume = value.as_number(name)?;
                self.update_volume();
            }
            AudioProperty::Loop => {
                self.state
                    .borrow_mut()
                    .track
                    .window
                    .set_looping(value.as_bool(name)?);
            }
        }
        Ok(())
    }
}
