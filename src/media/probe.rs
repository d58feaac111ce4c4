use std::{collections::BTreeMap, rc::Rc};

use futures::{FutureExt as _, future::LocalBoxFuture};

use crate::foundation::error::{VnmarkError, VnmarkResult};

/// Asynchronous duration probe for time-based media.
pub trait DurationProbe {
    /// Duration of the resource at `src`, in seconds.
    fn probe_duration_secs(&self, src: &str) -> LocalBoxFuture<'static, VnmarkResult<f64>>;
}

/// Probe answering from a fixed table, optionally deferring unknown sources.
///
/// A table key matches a source exactly or as its trailing path segment(s), so relative
/// locators still match once they were resolved against an assets root.
#[derive(Clone, Default)]
pub struct StaticDurationProbe {
    durations: BTreeMap<String, f64>,
    fallback: Option<Rc<dyn DurationProbe>>,
}

impl StaticDurationProbe {
    /// Empty table without fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known duration.
    pub fn with_duration(mut self, src: impl Into<String>, secs: f64) -> Self {
        self.durations.insert(src.into(), secs);
        self
    }

    /// Defer unknown sources to another probe.
    pub fn with_fallback(mut self, fallback: Rc<dyn DurationProbe>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn lookup(&self, src: &str) -> Option<f64> {
        if let Some(secs) = self.durations.get(src) {
            return Some(*secs);
        }
        self.durations
            .iter()
            .find(|(key, _)| src.ends_with(&format!("/{}", key.trim_start_matches("./"))))
            .map(|(_, secs)| *secs)
    }
}

impl std::fmt::Debug for StaticDurationProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticDurationProbe")
            .field("durations", &self.durations)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl DurationProbe for StaticDurationProbe {
    fn probe_duration_secs(&self, src: &str) -> LocalBoxFuture<'static, VnmarkResult<f64>> {
        if let Some(secs) = self.lookup(src) {
            return futures::future::ready(Ok(secs)).boxed_local();
        }
        match &self.fallback {
            Some(fallback) => fallback.probe_duration_secs(src),
            None => futures::future::ready(Err(VnmarkError::media(format!(
                "no known duration for '{src}'"
            ))))
            .boxed_local(),
        }
    }
}

/// Probe backed by the system `ffprobe` binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfprobeDurationProbe;

impl DurationProbe for FfprobeDurationProbe {
    fn probe_duration_secs(&self, src: &str) -> LocalBoxFuture<'static, VnmarkResult<f64>> {
        let src = src.to_string();
        async move { ffprobe_duration_secs(&src) }.boxed_local()
    }
}

#[cfg(feature = "media-ffmpeg")]
fn ffprobe_duration_secs(src: &str) -> VnmarkResult<f64> {
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(src)
        .output()
        .map_err(|e| VnmarkError::media(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(VnmarkError::media(format!(
            "ffprobe failed for '{src}': {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| VnmarkError::media(format!("ffprobe json parse failed: {e}")))?;
    parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| VnmarkError::media(format!("ffprobe reported no duration for '{src}'")))
}

#[cfg(not(feature = "media-ffmpeg"))]
fn ffprobe_duration_secs(_src: &str) -> VnmarkResult<f64> {
    Err(VnmarkError::media(
        "probing media durations requires the 'media-ffmpeg' feature",
    ))
}
