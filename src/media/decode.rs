use std::{cell::RefCell, collections::BTreeMap, rc::Rc, sync::Arc};

use futures::{FutureExt as _, future::LocalBoxFuture};

use crate::foundation::error::{VnmarkError, VnmarkResult};

#[derive(Clone, Debug, PartialEq)]
/// One decoded video frame in straight-alpha RGBA8.
pub struct DecodedFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes in row-major RGBA8.
    pub rgba8: Arc<Vec<u8>>,
}

impl DecodedFrame {
    /// Convert into an `image` buffer, e.g. for PNG output.
    pub fn to_rgba_image(&self) -> VnmarkResult<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.rgba8.as_ref().clone())
            .ok_or_else(|| {
                VnmarkError::media(format!(
                    "decoded frame has {} bytes, expected {}x{}x4",
                    self.rgba8.len(),
                    self.width,
                    self.height
                ))
            })
    }
}

/// Asynchronous still-frame decoder for video sources.
pub trait FrameDecoder {
    /// Decode the frame shown at `time_sec` into the source.
    fn decode_frame(
        &self,
        src: &str,
        time_sec: f64,
    ) -> LocalBoxFuture<'static, VnmarkResult<DecodedFrame>>;
}

/// Decoder backed by the system `ffmpeg`/`ffprobe` binaries.
///
/// Stream dimensions are read once per source and shared between clones.
#[derive(Clone, Debug, Default)]
pub struct FfmpegFrameDecoder {
    dimensions: Rc<RefCell<BTreeMap<String, (u32, u32)>>>,
}

impl FfmpegFrameDecoder {
    /// Decoder with an empty dimension cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn cached_dimensions(
        &self,
        src: &str,
        lookup: impl FnOnce(&str) -> VnmarkResult<(u32, u32)>,
    ) -> VnmarkResult<(u32, u32)> {
        if let Some(dims) = self.dimensions.borrow().get(src) {
            return Ok(*dims);
        }
        let dims = lookup(src)?;
        self.dimensions.borrow_mut().insert(src.to_string(), dims);
        Ok(dims)
    }
}

impl FrameDecoder for FfmpegFrameDecoder {
    fn decode_frame(
        &self,
        src: &str,
        time_sec: f64,
    ) -> LocalBoxFuture<'static, VnmarkResult<DecodedFrame>> {
        let decoder = self.clone();
        let src = src.to_string();
        async move {
            let dims = decoder.cached_dimensions(&src, ffprobe_dimensions)?;
            ffmpeg_decode_frame(&src, time_sec, dims)
        }
        .boxed_local()
    }
}

#[cfg(feature = "media-ffmpeg")]
fn ffprobe_dimensions(src: &str) -> VnmarkResult<(u32, u32)> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
    }

    let out = std::process::Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
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
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| VnmarkError::media(format!("no video stream found in '{src}'")))?;
    match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(VnmarkError::media(format!(
            "missing video dimensions for '{src}'"
        ))),
    }
}

#[cfg(not(feature = "media-ffmpeg"))]
fn ffprobe_dimensions(_src: &str) -> VnmarkResult<(u32, u32)> {
    Err(VnmarkError::media(
        "decoding video frames requires the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn ffmpeg_decode_frame(
    src: &str,
    time_sec: f64,
    (width, height): (u32, u32),
) -> VnmarkResult<DecodedFrame> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{:.9}", time_sec.max(0.0))])
        .arg("-i")
        .arg(src)
        .args([
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| VnmarkError::media(format!("failed to run ffmpeg for video decode: {e}")))?;
    if !out.status.success() {
        return Err(VnmarkError::media(format!(
            "cannot load video image from '{src}' at {time_sec:.3}s: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected_len = width as usize * height as usize * 4;
    if out.stdout.len() < expected_len {
        return Err(VnmarkError::media(format!(
            "decoded video frame has invalid size: got {} bytes, expected {expected_len}",
            out.stdout.len()
        )));
    }
    let mut rgba8 = out.stdout;
    rgba8.truncate(expected_len);
    Ok(DecodedFrame {
        width,
        height,
        rgba8: Arc::new(rgba8),
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
fn ffmpeg_decode_frame(
    _src: &str,
    _time_sec: f64,
    _dims: (u32, u32),
) -> VnmarkResult<DecodedFrame> {
    Err(VnmarkError::media(
        "decoding video frames requires the 'media-ffmpeg' feature",
    ))
}
