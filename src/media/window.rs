use crate::foundation::core::{Fps, FrameIndex};

/// Time window of one media resource on the render timeline.
///
/// `stopped` is monotonic: once set it never reverts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackWindow {
    start_frame: Option<FrameIndex>,
    duration_frames: u64,
    duration_millis: f64,
    looping: bool,
    stopped: bool,
}

impl PlaybackWindow {
    /// Record the probed duration, keeping both a real-time and a frame-count form.
    pub fn set_duration(&mut self, secs: f64, fps: Fps) {
        self.duration_millis = secs * 1000.0;
        self.duration_frames = fps.secs_to_frames_ceil(secs);
    }

    /// Anchor the window at `frame`.
    pub fn start(&mut self, frame: FrameIndex) {
        self.start_frame = Some(frame);
    }

    /// Stop playback for good.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Change the loop flag.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Loop flag.
    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Whether playback was stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Frame the window was anchored at, if started.
    pub fn start_frame(&self) -> Option<FrameIndex> {
        self.start_frame
    }

    /// Probed duration rounded up to whole frames.
    pub fn duration_frames(&self) -> u64 {
        self.duration_frames
    }

    /// Probed duration in milliseconds.
    pub fn duration_millis(&self) -> f64 {
        self.duration_millis
    }

    /// Whether the resource is audible/visible at `frame`.
    ///
    /// An unstarted window never plays; a started, non-looping one plays for exactly
    /// `duration_frames` frames.
    pub fn is_playing(&self, frame: FrameIndex) -> bool {
        let Some(start) = self.start_frame else {
            return false;
        };
        if self.stopped {
            return false;
        }
        self.looping || frame.since(start) < self.duration_frames
    }

    /// Offset into the media at `frame`, wrapping for looping resources.
    pub fn media_frame(&self, frame: FrameIndex) -> u64 {
        let Some(start) = self.start_frame else {
            return 0;
        };
        if self.duration_frames == 0 {
            return 0;
        }
        frame.since(start) % self.duration_frames
    }
}
