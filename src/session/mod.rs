//! Render sessions: wire a scene, a clock and the asset manager together and expose frame-level
//! rendering and composition metadata.

use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

use tracing::info;

use crate::{
    assets::{FrameAssetLog, FrameAssets, RenderAssetManager},
    clock::{FrameClock, SteppedClock},
    driver::FrameDriver,
    engine::{Engine, EngineState, View},
    foundation::{
        core::{Fps, FrameIndex},
        error::{VnmarkError, VnmarkResult},
        task::FrameTaskQueue,
    },
    media::{
        context::MediaContext,
        decode::FrameDecoder,
        probe::{DurationProbe, StaticDurationProbe},
    },
};

fn default_fps() -> u32 {
    60
}

fn default_file_name() -> String {
    "start".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
/// Input properties of one composition render.
pub struct RenderProps {
    /// Integer frame rate.
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Script file to start from.
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Predetermined choice indices, consumed in order.
    #[serde(default)]
    pub choices: Vec<usize>,
    /// Base directory for relative media locators.
    #[serde(default)]
    pub assets_root: Option<PathBuf>,
}

impl Default for RenderProps {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            file_name: default_file_name(),
            choices: Vec::new(),
            assets_root: None,
        }
    }
}

impl RenderProps {
    /// Read props from a JSON file.
    pub fn from_json_file(path: &Path) -> VnmarkResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VnmarkError::validation(format!("cannot read props '{}': {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Validated frame rate.
    pub fn fps(&self) -> VnmarkResult<Fps> {
        Fps::integer(self.fps)
    }
}

/// Media backends shared by every session of a render.
#[derive(Clone)]
pub struct MediaServices {
    /// Duration probe used when media loads.
    pub probe: Rc<dyn DurationProbe>,
    /// Frame decoder for video stills; ignored by dry runs.
    pub decoder: Option<Rc<dyn FrameDecoder>>,
}

impl Default for MediaServices {
    fn default() -> Self {
        Self {
            probe: Rc::new(StaticDurationProbe::new()),
            decoder: None,
        }
    }
}

impl std::fmt::Debug for MediaServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaServices")
            .field("has_decoder", &self.decoder.is_some())
            .finish()
    }
}

/// Engine/view pair of one session.
pub struct Scene {
    /// Script engine.
    pub engine: Rc<dyn Engine>,
    /// Presentation layer.
    pub view: Rc<dyn View>,
}

/// Builds a fresh [`Scene`] whose view creates its media through `media`.
pub trait SceneFactory {
    /// Create the scene for a new session.
    fn create_scene(&self, media: &MediaContext) -> VnmarkResult<Scene>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
/// Length and rate of a composition, as computed by a dry run.
pub struct CompositionMetadata {
    /// Total frames until the script finishes.
    pub duration_in_frames: u64,
    /// Frame rate.
    pub fps: u32,
}

/// One render of a composition: a driver plus the asset manager it reports into.
pub struct RenderSession {
    driver: FrameDriver,
    assets: Rc<RenderAssetManager>,
}

impl RenderSession {
    /// Build a scene from `factory` and start it.
    ///
    /// A dry run suppresses every asset registration and frame decode.
    pub async fn open(
        factory: &dyn SceneFactory,
        props: &RenderProps,
        services: &MediaServices,
        dry_run: bool,
    ) -> VnmarkResult<Self> {
        let fps = props.fps()?;
        let clock: Rc<dyn FrameClock> = Rc::new(SteppedClock::new(fps));
        let assets = Rc::new(RenderAssetManager::new());
        let frame_tasks = FrameTaskQueue::new();
        let media = MediaContext {
            clock: clock.clone(),
            sink: assets.clone(),
            dry_run,
            frame_tasks: frame_tasks.clone(),
            probe: services.probe.clone(),
            decoder: services.decoder.clone(),
            assets_root: props.assets_root.clone(),
        };
        let scene = factory.create_scene(&media)?;
        let mut driver = FrameDriver::new(
            scene.engine,
            scene.view,
            clock,
            props.choices.clone(),
            frame_tasks,
        );
        driver
            .init(EngineState {
                file_name: Some(props.file_name.clone()),
            })
            .await?;
        Ok(Self { driver, assets })
    }

    /// Current frame.
    pub fn frame(&self) -> FrameIndex {
        self.driver.frame()
    }

    /// Asset manager the session reports into.
    pub fn assets(&self) -> &RenderAssetManager {
        &self.assets
    }

    /// Underlying driver.
    pub fn driver_mut(&mut self) -> &mut FrameDriver {
        &mut self.driver
    }

    /// Advance to `frame` and snapshot the registered assets at the frame actually reached.
    pub async fn render_frame(&mut self, frame: FrameIndex) -> VnmarkResult<FrameAssets> {
        let reached = self.driver.advance_to(frame).await?;
        self.assets.collect_frame(reached);
        Ok(FrameAssets {
            frame: reached,
            assets: self.assets.registered(),
        })
    }

    /// Render `start..end`, stopping at the first frame the script could not reach.
    pub async fn render_range(
        &mut self,
        start: FrameIndex,
        end: FrameIndex,
    ) -> VnmarkResult<FrameAssetLog> {
        for frame in start.0..end.0 {
            let rendered = self.render_frame(FrameIndex(frame)).await?;
            if rendered.frame.0 < frame {
                break;
            }
        }
        Ok(self.assets.take_log())
    }

    /// Take the frames collected so far.
    pub fn take_log(&self) -> FrameAssetLog {
        self.assets.take_log()
    }

    /// Tear the scene and clock down.
    pub fn close(self) {
        self.driver.destroy();
    }
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("driver", &self.driver)
            .field("registered", &self.assets.registered().len())
            .finish()
    }
}

/// Compute the composition length with a dry run that plays the script to the end.
pub async fn calculate_metadata(
    factory: &dyn SceneFactory,
    props: &RenderProps,
    services: &MediaServices,
) -> VnmarkResult<CompositionMetadata> {
    let mut session = RenderSession::open(factory, props, services, true).await?;
    let duration_in_frames = session.driver_mut().run_to_completion().await?;
    session.close();
    info!(
        duration_in_frames,
        fps = props.fps,
        file_name = %props.file_name,
        "composition duration calculated"
    );
    Ok(CompositionMetadata {
        duration_in_frames,
        fps: props.fps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn props_fill_defaults() {
        let props: RenderProps = serde_json::from_str(r#"{"choices": [1, 0]}"#).unwrap();
        assert_eq!(props.fps, 60);
        assert_eq!(props.file_name, "start");
        assert_eq!(props.choices, vec![1, 0]);
        assert!(props.assets_root.is_none());
    }

    #[test]
    fn props_reject_zero_fps() {
        let props = RenderProps {
            fps: 0,
            ..RenderProps::default()
        };
        assert!(props.fps().is_err());
    }

    #[test]
    fn metadata_json_is_camel_case() {
        let json = serde_json::to_value(CompositionMetadata {
            duration_in_frames: 90,
            fps: 30,
        })
        .unwrap();
        assert_eq!(json["durationInFrames"], 90);
    }
}
