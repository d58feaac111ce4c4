use std::{cell::RefCell, path::PathBuf, rc::Rc, sync::Arc};

use futures::{FutureExt as _, executor::block_on, future::LocalBoxFuture};
use vnmark_render::{
    DecodedFrame, Fps, FrameClock, FrameDecoder, FrameIndex, FrameTaskQueue, MediaContext,
    MediaObject, PropertyValue, RenderAssetManager, StaticDurationProbe, SteppedClock,
    VnmarkResult,
};

#[derive(Default)]
struct RecordingDecoder {
    calls: Rc<RefCell<Vec<(String, f64)>>>,
}

impl FrameDecoder for RecordingDecoder {
    fn decode_frame(
        &self,
        src: &str,
        time_sec: f64,
    ) -> LocalBoxFuture<'static, VnmarkResult<DecodedFrame>> {
        self.calls.borrow_mut().push((src.to_string(), time_sec));
        let shade = (time_sec * 10.0).round() as u8;
        async move {
            Ok(DecodedFrame {
                width: 1,
                height: 1,
                rgba8: Arc::new(vec![shade, shade, shade, 255]),
            })
        }
        .boxed_local()
    }
}

struct Harness {
    clock: Rc<SteppedClock>,
    assets: Rc<RenderAssetManager>,
    tasks: FrameTaskQueue,
    media: MediaContext,
}

fn harness(fps: u32, dry_run: bool, decoder: Option<Rc<dyn FrameDecoder>>) -> Harness {
    let clock = Rc::new(SteppedClock::new(Fps::integer(fps).unwrap()));
    let assets = Rc::new(RenderAssetManager::new());
    let tasks = FrameTaskQueue::new();
    let probe = StaticDurationProbe::new()
        .with_duration("a.ogg", 2.0)
        .with_duration("short.ogg", 0.5)
        .with_duration("blip.ogg", 0.3)
        .with_duration("silence.ogg", 0.0)
        .with_duration("clip.mp4", 1.0);
    let media = MediaContext {
        clock: clock.clone(),
        sink: assets.clone(),
        dry_run,
        frame_tasks: tasks.clone(),
        probe: Rc::new(probe),
        decoder,
        assets_root: None,
    };
    Harness {
        clock,
        assets,
        tasks,
        media,
    }
}

fn advance(h: &Harness, frames: u64) {
    for _ in 0..frames {
        h.clock.next_frame();
    }
}

#[test]
fn audio_is_registered_for_its_window_then_withdrawn() {
    let h = harness(60, false, None);
    let audio = h.media.create_audio();
    block_on(audio.load("a.ogg")).unwrap();
    assert_eq!(audio.asset_id(), "audio-a.ogg-0");
    assert_eq!(audio.window().duration_frames(), 120);

    audio.attach().unwrap();
    let first = h.assets.get("audio-a.ogg-0").unwrap();
    assert_eq!(first.frame, FrameIndex(0));
    assert_eq!(first.media_frame, 0);

    for f in 1..120 {
        h.clock.next_frame();
        let asset = h.assets.get("audio-a.ogg-0").unwrap();
        assert_eq!(asset.frame, FrameIndex(f));
        assert_eq!(asset.media_frame, f);
        assert_eq!(asset.playback_rate, 1.0);
        assert!(audio.is_playing());
    }

    h.clock.next_frame();
    assert!(h.assets.get("audio-a.ogg-0").is_none());
    assert!(!audio.is_playing());
}

#[test]
fn looping_audio_wraps_media_frame() {
    let h = harness(10, false, None);
    let audio = h.media.create_audio();
    block_on(audio.load("short.ogg")).unwrap();
    audio.set_property("loop", true.into()).unwrap();
    audio.attach().unwrap();

    assert!(audio.create_playback_promise().now_or_never().is_some());

    advance(&h, 12);
    let asset = h.assets.get(&audio.asset_id()).unwrap();
    assert_eq!(asset.media_frame, 2);
    assert!(audio.is_playing());
    assert_eq!(audio.get_property("loop").unwrap(), PropertyValue::Bool(true));
}

#[test]
fn asset_id_embeds_load_frame() {
    let h = harness(10, false, None);
    advance(&h, 7);
    let audio = h.media.create_audio();
    block_on(audio.load("a.ogg")).unwrap();
    assert_eq!(audio.asset_id(), "audio-a.ogg-7");
}

#[test]
fn unchanged_composite_inputs_do_not_reregister() {
    let h = harness(10, false, None);
    let audio = h.media.create_audio();
    block_on(audio.load("a.ogg")).unwrap();
    audio.attach().unwrap();
    let (reg, unreg) = (h.assets.register_calls(), h.assets.unregister_calls());

    audio.set_property("value", 1.0.into()).unwrap();
    audio.set_property("volume", 1.0.into()).unwrap();
    assert_eq!(h.assets.register_calls(), reg);
    assert_eq!(h.assets.unregister_calls(), unreg);

    audio.set_property("volume", 0.5.into()).unwrap();
    audio.set_property("value", 0.5.into()).unwrap();
    assert_eq!(h.assets.register_calls(), reg + 2);
    assert_eq!(h.assets.unregister_calls(), unreg + 2);
    assert_eq!(audio.volume(), 0.25);
    assert_eq!(h.assets.get(&audio.asset_id()).unwrap().volume, 0.25);
}

#[test]
fn properties_set_before_attach_are_emitted_on_attach() {
    let h = harness(10, false, None);
    let audio = h.media.create_audio();
    block_on(audio.load("a.ogg")).unwrap();
    audio.set_property("volume", 0.4.into()).unwrap();
    assert_eq!(h.assets.register_calls(), 0);

    audio.attach().unwrap();
    assert_eq!(h.assets.get(&audio.asset_id()).unwrap().volume, 0.4);
}

#[test]
fn reload_and_early_attach_are_rejected() {
    let h = harness(10, false, None);
    let audio = h.media.create_audio();
    let err = audio.attach().unwrap_err();
    assert!(err.to_string().starts_with("contract violation:"));

    block_on(audio.load("a.ogg")).unwrap();
    let err = block_on(audio.load("short.ogg")).unwrap_err();
    assert!(err.to_string().contains("cannot reload"));
    assert_eq!(audio.url().as_deref(), Some("a.ogg"));
}

#[test]
fn unknown_media_fails_to_load() {
    let h = harness(10, false, None);
    let audio = h.media.create_audio();
    let err = block_on(audio.load("missing.ogg")).unwrap_err();
    assert!(err.to_string().contains("no known duration"));
}

#[test]
fn property_names_and_types_are_checked() {
    let h = harness(10, false, None);
    let audio = h.media.create_audio();
    let err = audio.get_property("pitch").unwrap_err();
    assert!(err.to_string().contains("unknown property \"pitch\""));
    assert!(audio.set_property("loop", 1.0.into()).is_err());
    assert!(audio.set_property("volume", true.into()).is_err());

    // Audio has no alpha.
    assert!(audio.get_property("alpha").is_err());
    let video = h.media.create_video();
    assert_eq!(
        video.get_property("alpha").unwrap(),
        PropertyValue::Number(1.0)
    );
}

#[test]
fn playback_promise_settles_when_window_ends() {
    let h = harness(10, false, None);
    let audio = h.media.create_audio();
    block_on(audio.load("blip.ogg")).unwrap();
    audio.attach().unwrap();

    let mut done = audio.create_playback_promise();
    advance(&h, 2);
    assert!((&mut done).now_or_never().is_none());
    advance(&h, 1);
    assert!(done.now_or_never().is_some());
    assert!(!audio.is_playing());
}

#[test]
fn zero_duration_media_never_plays() {
    let h = harness(10, false, None);
    let audio = h.media.create_audio();
    block_on(audio.load("silence.ogg")).unwrap();
    audio.attach().unwrap();
    assert!(!audio.is_playing());
    assert_eq!(audio.window().media_frame(FrameIndex(5)), 0);
    assert!(audio.create_playback_promise().now_or_never().is_some());
}

#[test]
fn detach_and_snap_withdraw_registration() {
    let h = harness(10, false, None);
    let a = h.media.create_audio();
    let b = h.media.create_audio();
    block_on(a.load("a.ogg")).unwrap();
    block_on(b.load("short.ogg")).unwrap();
    a.attach().unwrap();
    b.attach().unwrap();
    assert_eq!(h.clock.callback_count(), 2);

    a.detach();
    b.snap_playback();
    assert!(h.assets.registered().is_empty());
    assert_eq!(h.clock.callback_count(), 0);
    assert!(a.window().is_stopped());

    advance(&h, 1);
    assert!(h.assets.registered().is_empty());
}

#[test]
fn dry_run_emits_and_decodes_nothing() {
    let decoder = Rc::new(RecordingDecoder::default());
    let calls = decoder.calls.clone();
    let h = harness(10, true, Some(decoder));
    let audio = h.media.create_audio();
    let video = h.media.create_video();
    block_on(audio.load("a.ogg")).unwrap();
    block_on(video.load("clip.mp4")).unwrap();
    audio.attach().unwrap();
    video.attach().unwrap();
    advance(&h, 5);
    video.set_property("alpha", 0.5.into()).unwrap();
    video.detach();

    assert_eq!(h.assets.register_calls(), 0);
    assert_eq!(h.assets.unregister_calls(), 0);
    assert!(h.tasks.is_empty());
    assert!(calls.borrow().is_empty());
    // Time still moves for the windows.
    assert!(audio.is_playing());
}

#[test]
fn video_decodes_one_still_per_frame() {
    let decoder = Rc::new(RecordingDecoder::default());
    let calls = decoder.calls.clone();
    let mut h = harness(10, false, Some(decoder));
    h.media.assets_root = Some(PathBuf::from("/pkg"));
    let video = h.media.create_video();
    block_on(video.load("clip.mp4")).unwrap();
    video.attach().unwrap();
    assert!(video.current_frame_image().is_none());

    for _ in 0..3 {
        h.clock.next_frame();
        assert_eq!(h.tasks.len(), 1);
        block_on(futures::future::try_join_all(h.tasks.take_all())).unwrap();
    }

    let calls = calls.borrow();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(src, _)| src == "/pkg/clip.mp4"));
    for (i, (_, t)) in calls.iter().enumerate() {
        assert!((t - (i as f64 + 1.0) * 0.1).abs() < 1e-9);
    }
    let image = video.current_frame_image().unwrap();
    assert_eq!(image.rgba8[0], 3);

    let asset = h.assets.get(&video.asset_id()).unwrap();
    assert_eq!(asset.src, "/pkg/clip.mp4");
    assert_eq!(asset.media_frame, 3);
    assert_eq!(asset.opacity, Some(1.0));
}

#[test]
fn video_composites_opacity_and_volume_separately() {
    let h = harness(10, false, None);
    let video = h.media.create_video();
    block_on(video.load("clip.mp4")).unwrap();
    video.attach().unwrap();

    video.set_property("value", 0.5.into()).unwrap();
    video.set_property("alpha", 0.5.into()).unwrap();
    video.set_property("volume", 0.8.into()).unwrap();
    assert_eq!(video.opacity(), 0.25);
    assert_eq!(video.volume(), 0.4);

    let asset = h.assets.get(&video.asset_id()).unwrap();
    assert_eq!(asset.opacity, Some(0.25));
    assert_eq!(asset.volume, 0.4);
}

#[test]
fn non_finite_volume_leaves_registration_alone() {
    let h = harness(10, false, None);
    let video = h.media.create_video();
    block_on(video.load("clip.mp4")).unwrap();
    video.attach().unwrap();
    let reg = h.assets.register_calls();

    for _ in 0..2 {
        assert!(video.set_property("volume", f64::NAN.into()).is_err());
    }
    assert!(video.set_property("alpha", f64::INFINITY.into()).is_err());
    assert_eq!(h.assets.register_calls(), reg);
    assert_eq!(video.volume(), 1.0);
    assert_eq!(video.opacity(), 1.0);
}

#[test]
fn video_stops_decoding_after_window_and_snap_keeps_image() {
    let decoder = Rc::new(RecordingDecoder::default());
    let h = harness(10, false, Some(decoder));
    let video = h.media.create_video();
    block_on(video.load("clip.mp4")).unwrap();
    video.attach().unwrap();

    advance(&h, 2);
    block_on(futures::future::try_join_all(h.tasks.take_all())).unwrap();
    video.snap_playback();
    assert!(video.current_frame_image().is_some());
    assert!(h.assets.get(&video.asset_id()).is_none());

    advance(&h, 1);
    assert!(h.tasks.is_empty());

    video.detach();
    assert!(video.current_frame_image().is_none());
}

#[test]
fn video_past_its_window_queues_no_decodes() {
    let decoder = Rc::new(RecordingDecoder::default());
    let h = harness(10, false, Some(decoder));
    let video = h.media.create_video();
    block_on(video.load("clip.mp4")).unwrap();
    video.attach().unwrap();

    advance(&h, 9);
    h.tasks.take_all();
    advance(&h, 1);
    assert!(h.tasks.is_empty());
    assert!(h.assets.get(&video.asset_id()).is_none());
}
