use std::{path::Path, rc::Rc};

use crate::{
    assets::{AssetKind, RenderAsset, RenderAssetSink, absolute_src},
    foundation::{
        core::FrameIndex,
        error::{VnmarkError, VnmarkResult},
    },
    media::window::PlaybackWindow,
};

/// Host sink wrapper that swallows all traffic during a dry run.
#[derive(Clone)]
pub(crate) struct AssetEmitter {
    sink: Rc<dyn RenderAssetSink>,
    dry_run: bool,
}

impl AssetEmitter {
    pub(crate) fn new(sink: Rc<dyn RenderAssetSink>, dry_run: bool) -> Self {
        Self { sink, dry_run }
    }

    fn register(&self, asset: RenderAsset) {
        if !self.dry_run {
            self.sink.register_render_asset(asset);
        }
    }

    pub(crate) fn unregister(&self, id: &str) {
        if !self.dry_run {
            self.sink.unregister_render_asset(id);
        }
    }
}

/// Resource identity and playback window shared by both adapter variants.
#[derive(Debug)]
pub(crate) struct MediaTrack {
    kind: AssetKind,
    url: Option<String>,
    src: String,
    asset_id: String,
    pub(crate) window: PlaybackWindow,
}

impl MediaTrack {
    pub(crate) fn new(kind: AssetKind) -> Self {
        Self {
            kind,
            url: None,
            src: String::new(),
            asset_id: String::new(),
            window: PlaybackWindow::default(),
        }
    }

    pub(crate) fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub(crate) fn src(&self) -> &str {
        &self.src
    }

    pub(crate) fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.url.is_some()
    }

    /// Fix the resource identity; the id embeds the frame current at load time.
    pub(crate) fn begin_load(
        &mut self,
        url: &str,
        frame: FrameIndex,
        root: Option<&Path>,
    ) -> VnmarkResult<String> {
        if self.url.is_some() {
            return Err(VnmarkError::validation(format!(
                "cannot reload {} object '{}'",
                kind_name(self.kind),
                self.url.as_deref().unwrap_or_default()
            )));
        }
        self.url = Some(url.to_string());
        self.asset_id = format!("{}-{url}-{}", kind_name(self.kind), frame.0);
        self.src = absolute_src(root, url);
        Ok(self.src.clone())
    }

    fn descriptor(&self, frame: FrameIndex, volume: f64, opacity: Option<f64>) -> RenderAsset {
        RenderAsset {
            kind: self.kind,
            src: self.src.clone(),
            id: self.asset_id.clone(),
            frame,
            volume,
            media_frame: self.window.media_frame(frame),
            playback_rate: 1.0,
            tone_frequency: None,
            audio_start_frame: 0,
            opacity,
        }
    }

    /// Register the descriptor for `frame` unconditionally.
    pub(crate) fn register(
        &self,
        emitter: &AssetEmitter,
        frame: FrameIndex,
        volume: f64,
        opacity: Option<f64>,
    ) {
        emitter.register(self.descriptor(frame, volume, opacity));
    }

    /// Drop the previous registration, then re-register only while playing.
    pub(crate) fn refresh(
        &self,
        emitter: &AssetEmitter,
        frame: FrameIndex,
        volume: f64,
        opacity: Option<f64>,
    ) {
        emitter.unregister(&self.asset_id);
        if self.window.is_playing(frame) {
            self.register(emitter, frame, volume, opacity);
        }
    }
}

/// Reject probe results that cannot describe a playback window.
pub(crate) fn check_duration(src: &str, secs: f64) -> VnmarkResult<()> {
    if secs.is_finite() && secs >= 0.0 {
        Ok(())
    } else {
        Err(VnmarkError::media(format!(
            "invalid duration {secs} probed for '{src}'"
        )))
    }
}

fn kind_name(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Audio => "audio",
        AssetKind::Video => "video",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assets::RenderAssetManager, foundation::core::Fps};

    #[test]
    fn reload_is_rejected_and_id_uses_load_frame() {
        let mut track = MediaTrack::new(AssetKind::Audio);
        let src = track
            .begin_load("se/click.ogg", FrameIndex(7), Some(Path::new("/pkg")))
            .unwrap();
        assert_eq!(src, "/pkg/se/click.ogg");
        assert_eq!(track.asset_id(), "audio-se/click.ogg-7");
        let err = track
            .begin_load("se/other.ogg", FrameIndex(8), None)
            .unwrap_err();
        assert!(matches!(err, VnmarkError::Validation(_)));
        assert_eq!(track.url(), Some("se/click.ogg"));
    }

    #[test]
    fn dry_run_emitter_is_silent() {
        let sink = Rc::new(RenderAssetManager::new());
        let emitter = AssetEmitter::new(sink.clone(), true);
        let mut track = MediaTrack::new(AssetKind::Video);
        track.begin_load("v.mp4", FrameIndex(0), None).unwrap();
        track.window.set_duration(1.0, Fps::integer(10).unwrap());
        track.window.start(FrameIndex(0));
        track.refresh(&emitter, FrameIndex(0), 1.0, Some(1.0));
        assert_eq!(sink.register_calls(), 0);
        assert_eq!(sink.unregister_calls(), 0);
    }
}
