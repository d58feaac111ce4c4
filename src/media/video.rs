use std::{cell::RefCell, rc::Rc};

use futures::{FutureExt as _, future::LocalBoxFuture};
use tracing::debug;

use crate::{
    assets::AssetKind,
    clock::CallbackOwner,
    foundation::{
        core::{Fps, FrameIndex},
        error::{VnmarkError, VnmarkResult},
        task::FrameTask,
    },
    media::{
        MediaObject,
        context::MediaContext,
        decode::{DecodedFrame, FrameDecoder},
        property::{PropertyValue, VideoProperty},
        signal::Composite,
        track::{AssetEmitter, MediaTrack, check_duration},
        window::PlaybackWindow,
    },
};

#[derive(Debug)]
struct VideoState {
    track: MediaTrack,
    value: f64,
    property_alpha: f64,
    property_volume: f64,
    opacity: Composite,
    volume: Composite,
}

impl VideoState {
    fn emit(&self, emitter: &AssetEmitter, frame: FrameIndex) {
        self.track
            .refresh(emitter, frame, self.volume.get(), Some(self.opacity.get()));
    }
}

type ImageSlot = Rc<RefCell<Option<DecodedFrame>>>;

/// Video element: a host video asset for its audio track plus a decoded still per frame.
///
/// Emits `value * alpha` as opacity and `value * volume` as volume.
pub struct VideoAdapter {
    ctx: MediaContext,
    emitter: AssetEmitter,
    owner: CallbackOwner,
    state: Rc<RefCell<VideoState>>,
    image: ImageSlot,
}

impl VideoAdapter {
    pub(crate) fn new(ctx: MediaContext) -> Self {
        let emitter = ctx.emitter();
        Self {
            ctx,
            emitter,
            owner: CallbackOwner::allocate(),
            state: Rc::new(RefCell::new(VideoState {
                track: MediaTrack::new(AssetKind::Video),
                value: 1.0,
                property_alpha: 1.0,
                property_volume: 1.0,
                opacity: Composite::default(),
                volume: Composite::default(),
            })),
            image: Rc::new(RefCell::new(None)),
        }
    }

    /// Id used for host registrations (empty until loaded).
    pub fn asset_id(&self) -> String {
        self.state.borrow().track.asset_id().to_string()
    }

    /// Composite opacity currently emitted.
    pub fn opacity(&self) -> f64 {
        self.state.borrow().opacity.get()
    }

    /// Composite volume currently emitted.
    pub fn volume(&self) -> f64 {
        self.state.borrow().volume.get()
    }

    /// Snapshot of the playback window.
    pub fn window(&self) -> PlaybackWindow {
        self.state.borrow().track.window
    }

    /// Most recently decoded still, if any.
    pub fn current_frame_image(&self) -> Option<DecodedFrame> {
        self.image.borrow().clone()
    }

    fn update_composites(&self) {
        let mut st = self.state.borrow_mut();
        let opacity_inputs = [st.value, st.property_alpha];
        let volume_inputs = [st.value, st.property_volume];
        let opacity_changed = st.opacity.update(&opacity_inputs);
        let volume_changed = st.volume.update(&volume_inputs);
        if (opacity_changed || volume_changed) && st.track.window.start_frame().is_some() {
            st.emit(&self.emitter, self.ctx.clock.frame());
        }
    }

    fn stop(&self, reason: &str) {
        let mut st = self.state.borrow_mut();
        st.track.window.stop();
        self.ctx.clock.remove_frame_callback(self.owner);
        self.emitter.unregister(st.track.asset_id());
        debug!(id = %st.track.asset_id(), "video {reason}");
    }
}

fn decode_task(
    decoder: &dyn FrameDecoder,
    src: &str,
    time_sec: f64,
    image: ImageSlot,
) -> FrameTask {
    let decoding = decoder.decode_frame(src, time_sec);
    async move {
        let decoded = decoding.await?;
        *image.borrow_mut() = Some(decoded);
        Ok(())
    }
    .boxed_local()
}

impl std::fmt::Debug for VideoAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoAdapter")
            .field("owner", &self.owner)
            .field("state", &self.state.borrow())
            .field("has_image", &self.image.borrow().is_some())
            .finish()
    }
}

impl MediaObject for VideoAdapter {
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
                "video loaded"
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
                    "cannot attach a video object before it is loaded",
                ));
            }
            st.track.window.start(frame);
            let (volume, opacity) = (st.volume.get(), st.opacity.get());
            st.track.register(&self.emitter, frame, volume, Some(opacity));
        }

        let state = self.state.clone();
        let emitter = self.emitter.clone();
        let image = self.image.clone();
        let tasks = self.ctx.frame_tasks.clone();
        let decoder = if self.ctx.dry_run {
            None
        } else {
            self.ctx.decoder.clone()
        };
        let fps: Fps = self.ctx.clock.fps();
        self.ctx.clock.add_frame_callback(
            self.owner,
            Box::new(move |frame| {
                let st = state.borrow();
                if let Some(decoder) = &decoder
                    && st.track.window.is_playing(frame)
                {
                    let time_sec = fps.frames_to_secs(st.track.window.media_frame(frame));
                    tasks.push(decode_task(
                        decoder.as_ref(),
                        st.track.src(),
                        time_sec,
                        image.clone(),
                    ));
                }
                st.emit(&emitter, frame);
            }),
        );
        debug!(id = %self.asset_id(), frame = frame.0, "video attached");
        Ok(())
    }

    fn detach(&self) {
        self.stop("detached");
        self.image.borrow_mut().take();
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
        self.stop("snapped");
    }

    fn get_property(&self, name: &str) -> VnmarkResult<PropertyValue> {
        let st = self.state.borrow();
        Ok(match name.parse::<VideoProperty>()? {
            VideoProperty::Value => PropertyValue::Number(st.value),
            VideoProperty::Alpha => PropertyValue::Number(st.property_alpha),
            VideoProperty::Volume => PropertyValue::Number(st.property_volume),
            VideoProperty::Loop => PropertyValue::Bool(st.track.window.looping()),
        })
    }

    fn set_property(&self, name: &str, value: PropertyValue) -> VnmarkResult<()> {
        match name.parse::<VideoProperty>()? {
            VideoProperty::Value => {
                self.state.borrow_mut().value = value.as_number(name)?;
                self.update_composites();
            }
            VideoProperty::Alpha => {
                self.state.borrow_mut().property_alpha = value.as_number(name)?;
                self.update_composites();
            }
            VideoProperty::Volume => {
                self.state.borrow_mut().property_volume = value.as_number(name)?;
                self.update_composites();
            }
            VideoProperty::Loop => {
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
