//! Host-side asset pipeline: descriptors that media adapters declare for every frame, and an
//! in-memory manager that collects them into a per-frame log for later muxing.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    path::Path,
};

use crate::foundation::core::FrameIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
/// Media kind of a [`RenderAsset`].
pub enum AssetKind {
    /// Audio-only resource.
    Audio,
    /// Video resource; its audio track is muxed, its opacity is reported.
    Video,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
/// One asset registration as seen by the host pipeline.
pub struct RenderAsset {
    /// Media kind.
    #[serde(rename = "type")]
    pub kind: AssetKind,
    /// Absolute source locator.
    pub src: String,
    /// Stable id, assigned once per resource load.
    pub id: String,
    /// Timeline frame this registration describes.
    pub frame: FrameIndex,
    /// Composite volume.
    pub volume: f64,
    /// Offset into the media, in frames, at `frame`.
    pub media_frame: u64,
    /// Playback rate (always 1).
    pub playback_rate: f64,
    /// Pitch shift (never used).
    pub tone_frequency: Option<f64>,
    /// Audio trim start in frames (always 0).
    pub audio_start_frame: u64,
    /// Composite opacity; video only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

/// Registration surface of the host asset pipeline.
///
/// Both calls are idempotent from the host's point of view: registering an existing id replaces
/// the previous descriptor, unregistering an unknown id does nothing.
pub trait RenderAssetSink {
    /// Declare (or replace) an asset for the current frame.
    fn register_render_asset(&self, asset: RenderAsset);
    /// Withdraw the asset with the given id.
    fn unregister_render_asset(&self, id: &str);
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
/// Assets registered at the end of one settled frame.
pub struct FrameAssets {
    /// Frame the snapshot was taken at.
    pub frame: FrameIndex,
    /// Registered assets ordered by id.
    pub assets: Vec<RenderAsset>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
/// Contiguous summary of one asset id across a [`FrameAssetLog`].
pub struct AssetSpan {
    /// Media kind.
    pub kind: AssetKind,
    /// Source locator.
    pub src: String,
    /// First frame the asset was registered at.
    pub first_frame: FrameIndex,
    /// Last frame the asset was registered at (inclusive).
    pub last_frame: FrameIndex,
    /// Number of frames the asset was registered at.
    pub frames: u64,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
/// Per-frame asset declarations collected over a render.
pub struct FrameAssetLog {
    /// Snapshots in increasing frame order.
    pub frames: Vec<FrameAssets>,
}

impl FrameAssetLog {
    /// Assets registered at `frame`, if that frame was collected.
    pub fn at(&self, frame: FrameIndex) -> Option<&[RenderAsset]> {
        self.frames
            .binary_search_by_key(&frame, |f| f.frame)
            .ok()
            .map(|i| self.frames[i].assets.as_slice())
    }

    /// Summarize each asset id by the frames it was registered at.
    pub fn spans(&self) -> BTreeMap<String, AssetSpan> {
        let mut out = BTreeMap::<String, AssetSpan>::new();
        for snapshot in &self.frames {
            for asset in &snapshot.assets {
                out.entry(asset.id.clone())
                    .and_modify(|span| {
                        span.last_frame = snapshot.frame;
                        span.frames += 1;
                    })
                    .or_insert_with(|| AssetSpan {
                        kind: asset.kind,
                        src: asset.src.clone(),
                        first_frame: snapshot.frame,
                        last_frame: snapshot.frame,
                        frames: 1,
                    });
            }
        }
        out
    }
}

/// In-memory [`RenderAssetSink`] keyed by asset id.
#[derive(Debug, Default)]
pub struct RenderAssetManager {
    registered: RefCell<BTreeMap<String, RenderAsset>>,
    log: RefCell<FrameAssetLog>,
    register_calls: Cell<u64>,
    unregister_calls: Cell<u64>,
}

impl RenderAssetManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently registered assets ordered by id.
    pub fn registered(&self) -> Vec<RenderAsset> {
        self.registered.borrow().values().cloned().collect()
    }

    /// Currently registered asset with the given id.
    pub fn get(&self, id: &str) -> Option<RenderAsset> {
        self.registered.borrow().get(id).cloned()
    }

    /// Total `register_render_asset` calls received.
    pub fn register_calls(&self) -> u64 {
        self.register_calls.get()
    }

    /// Total `unregister_render_asset` calls received.
    pub fn unregister_calls(&self) -> u64 {
        self.unregister_calls.get()
    }

    /// Append the currently registered set to the frame log.
    ///
    /// Collecting the same frame twice replaces the earlier snapshot.
    pub fn collect_frame(&self, frame: FrameIndex) {
        let snapshot = FrameAssets {
            frame,
            assets: self.registered(),
        };
        let mut log = self.log.borrow_mut();
        match log.frames.last_mut() {
            Some(last) if last.frame == frame => *last = snapshot,
            _ => log.frames.push(snapshot),
        }
    }

    /// Copy of the frame log collected so far.
    pub fn log(&self) -> FrameAssetLog {
        self.log.borrow().clone()
    }

    /// Take the frame log, leaving an empty one behind.
    pub fn take_log(&self) -> FrameAssetLog {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}

impl RenderAssetSink for RenderAssetManager {
    fn register_render_asset(&self, asset: RenderAsset) {
        self.register_calls.set(self.register_calls.get() + 1);
        self.registered.borrow_mut().insert(asset.id.clone(), asset);
    }

    fn unregister_render_asset(&self, id: &str) {
        self.unregister_calls.set(self.unregister_calls.get() + 1);
        self.registered.borrow_mut().remove(id);
    }
}

/// Resolve a media locator against the assets root.
///
/// URLs (anything with a scheme) and absolute paths are returned unchanged; relative locators
/// are joined onto `root` with forward slashes.
pub fn absolute_src(root: Option<&Path>, locator: &str) -> String {
    if locator.contains("://") || locator.starts_with("data:") || Path::new(locator).is_absolute()
    {
        return locator.to_string();
    }
    match root {
        Some(root) => {
            let root = root.to_string_lossy();
            let root = root.trim_end_matches(['/', '\\']);
            let rel = locator.trim_start_matches("./").replace('\\', "/");
            if root.is_empty() {
                rel
            } else {
                format!("{root}/{rel}")
            }
        }
        None => locator.to_string(),
    }
}
