use crate::foundation::error::{VnmarkError, VnmarkResult};

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
/// Zero-based frame number on the render timeline.
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// Frame directly after this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Frames elapsed since `earlier` (zero if `earlier` is in the future).
    pub fn since(self, earlier: FrameIndex) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// Fixed frame rate expressed as a rational `num / den`.
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be > 0.
    pub den: u32,
}

impl Fps {
    /// Build a validated frame rate.
    pub fn new(num: u32, den: u32) -> VnmarkResult<Self> {
        if den == 0 {
            return Err(VnmarkError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(VnmarkError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Integer frame rate (`num / 1`).
    pub fn integer(fps: u32) -> VnmarkResult<Self> {
        Self::new(fps, 1)
    }

    /// Frame rate as frames per second.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of a single frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert a frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Convert seconds to a frame count, rounding partial frames up.
    pub fn secs_to_frames_ceil(self, secs: f64) -> u64 {
        (secs * self.as_f64()).ceil().max(0.0) as u64
    }

    /// Convert milliseconds to a frame count, rounding partial frames up.
    pub fn millis_to_frames_ceil(self, millis: f64) -> u64 {
        (millis * self.as_f64() / 1000.0).ceil().max(0.0) as u64
    }

    /// Whether `frame` falls on a whole second boundary.
    pub fn is_whole_second(self, frame: FrameIndex) -> bool {
        self.den == 1 && frame.0.is_multiple_of(u64::from(self.num))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_rejects_zero_parts() {
        assert!(Fps::new(0, 1).is_err());
        assert!(Fps::new(30, 0).is_err());
        assert_eq!(Fps::integer(60).unwrap().as_f64(), 60.0);
    }

    #[test]
    fn secs_to_frames_rounds_up() {
        let fps = Fps::integer(60).unwrap();
        assert_eq!(fps.secs_to_frames_ceil(2.0), 120);
        assert_eq!(fps.secs_to_frames_ceil(2.001), 121);
        assert_eq!(fps.secs_to_frames_ceil(0.0), 0);
        assert_eq!(fps.millis_to_frames_ceil(2000.0), 120);
        assert_eq!(fps.millis_to_frames_ceil(1.0), 1);
    }

    #[test]
    fn frame_index_since_saturates() {
        assert_eq!(FrameIndex(10).since(FrameIndex(4)), 6);
        assert_eq!(FrameIndex(4).since(FrameIndex(10)), 0);
        assert_eq!(FrameIndex(4).next(), FrameIndex(5));
    }

    #[test]
    fn whole_second_detection() {
        let fps = Fps::integer(30).unwrap();
        assert!(fps.is_whole_second(FrameIndex(60)));
        assert!(!fps.is_whole_second(FrameIndex(61)));
    }
}
