//! Cue sheets: a minimal, JSON-described scene script that implements both [`Engine`] and
//! [`View`] on top of the media adapters.
//!
//! A sheet is a set of named scenes, each an ordered list of steps. Steps run eagerly until one
//! blocks (a frame wait, a playback wait, a pending load or a choice); blocked waits are resumed
//! from the sheet's own frame callback, so a wait that ends at frame N continues at frame N.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    path::Path,
    rc::{Rc, Weak},
};

use futures::{FutureExt as _, future::LocalBoxFuture};
use tracing::debug;

use crate::{
    clock::CallbackOwner,
    engine::{ChoiceSelector, Engine, EngineState, EngineStatus, LoadingFuture, View, ViewStatus},
    foundation::error::{VnmarkError, VnmarkResult},
    media::{
        MediaObject, audio::AudioAdapter, context::MediaContext, decode::DecodedFrame,
        probe::StaticDurationProbe, property::PropertyValue, video::VideoAdapter,
    },
    session::{Scene, SceneFactory},
};

const DEFAULT_SCENE: &str = "start";

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
/// One step of a cue sheet scene.
pub enum CueStep {
    /// Load, configure and attach an audio element named `name`.
    Audio {
        /// Element name; replaces an element of the same name.
        name: String,
        /// Media locator.
        src: String,
        /// Properties applied before attaching.
        #[serde(default)]
        properties: BTreeMap<String, PropertyValue>,
    },
    /// Load, configure and attach a video element named `name`.
    Video {
        /// Element name; replaces an element of the same name.
        name: String,
        /// Media locator.
        src: String,
        /// Properties applied before attaching.
        #[serde(default)]
        properties: BTreeMap<String, PropertyValue>,
    },
    /// Set one property of an attached element.
    Set {
        /// Element name.
        name: String,
        /// Property name.
        property: String,
        /// New value.
        value: PropertyValue,
    },
    /// Block for a number of frames.
    Wait {
        /// Frames to wait.
        frames: u64,
    },
    /// Block until a one-shot element finishes playing.
    WaitPlayback {
        /// Element name.
        name: String,
    },
    /// Detach an element.
    Stop {
        /// Element name.
        name: String,
    },
    /// Cut an element's playback short, leaving its last image in place.
    Snap {
        /// Element name.
        name: String,
    },
    /// Ask for a choice; option `i` continues with scene `options[i]`.
    Choice {
        /// Scene name per option.
        options: Vec<String>,
    },
    /// Continue with another scene.
    Jump {
        /// Scene name.
        scene: String,
    },
    /// Finish the script.
    End,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
/// A complete cue sheet.
pub struct CueSheet {
    /// Known media durations in seconds, keyed by locator.
    #[serde(default)]
    pub durations: BTreeMap<String, f64>,
    /// Scenes by name; execution starts at `start` unless told otherwise.
    pub scenes: BTreeMap<String, Vec<CueStep>>,
}

impl CueSheet {
    /// Parse a sheet from JSON text.
    pub fn from_json(text: &str) -> VnmarkResult<Self> {
        let sheet: Self = serde_json::from_str(text)?;
        sheet.validate()?;
        Ok(sheet)
    }

    /// Read and parse a sheet file.
    pub fn from_json_file(path: &Path) -> VnmarkResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VnmarkError::validation(format!("cannot read cue sheet '{}': {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Check that every scene referenced by a step exists.
    pub fn validate(&self) -> VnmarkResult<()> {
        for (scene, steps) in &self.scenes {
            for step in steps {
                let targets: &[String] = match step {
                    CueStep::Choice { options } => {
                        if options.is_empty() {
                            return Err(VnmarkError::validation(format!(
                                "choice without options in scene '{scene}'"
                            )));
                        }
                        options
                    }
                    CueStep::Jump { scene } => std::slice::from_ref(scene),
                    _ => &[],
                };
                if let Some(missing) = targets.iter().find(|t| !self.scenes.contains_key(*t)) {
                    return Err(VnmarkError::validation(format!(
                        "scene '{scene}' references unknown scene '{missing}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Duration table as a probe (without fallback).
    pub fn duration_probe(&self) -> StaticDurationProbe {
        self.durations
            .iter()
            .fold(StaticDurationProbe::new(), |probe, (src, secs)| {
                probe.with_duration(src.clone(), *secs)
            })
    }
}

#[derive(Clone)]
enum Element {
    Audio(Rc<AudioAdapter>),
    Video(Rc<VideoAdapter>),
}

impl Element {
    fn object(&self) -> Rc<dyn MediaObject> {
        match self {
            Self::Audio(a) => a.clone() as Rc<dyn MediaObject>,
            Self::Video(v) => v.clone(),
        }
    }
}

#[derive(Default)]
enum Block {
    #[default]
    None,
    Frames(u64),
    Playback(LocalBoxFuture<'static, ()>),
    Loading(LoadingFuture),
    Choice(Vec<String>),
}

#[derive(Default)]
struct Runtime {
    scene: String,
    pc: usize,
    started: bool,
    finished: bool,
    block: Block,
    error: Option<VnmarkError>,
    // Attach order; later entries are stacked on top.
    elements: Vec<(String, Element)>,
}

struct CueInner {
    sheet: CueSheet,
    media: MediaContext,
    owner: CallbackOwner,
    runtime: RefCell<Runtime>,
}

/// Engine and view driving a [`CueSheet`].
pub struct CuePlayer {
    inner: Rc<CueInner>,
}

impl CuePlayer {
    /// Create a player whose elements are built from `media`.
    pub fn new(sheet: CueSheet, media: MediaContext) -> Self {
        Self {
            inner: Rc::new(CueInner {
                sheet,
                media,
                owner: CallbackOwner::allocate(),
                runtime: RefCell::new(Runtime::default()),
            }),
        }
    }

    /// Names of attached elements, bottom to top.
    pub fn element_names(&self) -> Vec<String> {
        self.inner
            .runtime
            .borrow()
            .elements
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Latest decoded image of the topmost video element that has one.
    pub fn top_video_image(&self) -> Option<DecodedFrame> {
        self.inner
            .runtime
            .borrow()
            .elements
            .iter()
            .rev()
            .find_map(|(_, element)| match element {
                Element::Video(v) => v.current_frame_image(),
                Element::Audio(_) => None,
            })
    }

    /// Whether the script has finished.
    pub fn is_finished(&self) -> bool {
        self.inner.runtime.borrow().finished
    }
}

impl std::fmt::Debug for CuePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rt = self.inner.runtime.borrow();
        f.debug_struct("CuePlayer")
            .field("scene", &rt.scene)
            .field("pc", &rt.pc)
            .field("finished", &rt.finished)
            .field("elements", &rt.elements.len())
            .finish()
    }
}

impl CueInner {
    fn element(&self, name: &str) -> VnmarkResult<Element> {
        self.runtime
            .borrow()
            .elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, e)| e.clone())
            .ok_or_else(|| VnmarkError::contract(format!("no element named '{name}'")))
    }

    fn put_element(&self, name: String, element: Element) {
        let replaced = {
            let mut rt = self.runtime.borrow_mut();
            let old = rt
                .elements
                .iter()
                .position(|(n, _)| *n == name)
                .map(|i| rt.elements.remove(i).1);
            rt.elements.push((name, element));
            old
        };
        if let Some(old) = replaced {
            old.object().detach();
        }
    }

    fn remove_element(&self, name: &str) -> VnmarkResult<Element> {
        let mut rt = self.runtime.borrow_mut();
        let i = rt
            .elements
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| VnmarkError::contract(format!("no element named '{name}'")))?;
        Ok(rt.elements.remove(i).1)
    }

    fn enter_scene(&self, scene: &str) -> VnmarkResult<()> {
        if !self.sheet.scenes.contains_key(scene) {
            return Err(VnmarkError::validation(format!("unknown scene '{scene}'")));
        }
        let mut rt = self.runtime.borrow_mut();
        rt.scene = scene.to_string();
        rt.pc = 0;
        debug!(scene, "entering scene");
        Ok(())
    }
}

fn load_element(
    inner: &Rc<CueInner>,
    name: String,
    element: Element,
    src: String,
    properties: BTreeMap<String, PropertyValue>,
) -> LoadingFuture {
    let inner = inner.clone();
    async move {
        let object = element.object();
        object.load(&src).await?;
        for (property, value) in properties {
            object.set_property(&property, value)?;
        }
        object.attach()?;
        inner.put_element(name, element);
        Ok(())
    }
    .boxed_local()
}

/// Whether the runtime may run its next step; clears finished playback waits.
fn unblocked(rt: &mut Runtime) -> bool {
    let done = match &mut rt.block {
        Block::None => true,
        Block::Frames(n) => *n == 0,
        Block::Playback(playback) => playback.as_mut().now_or_never().is_some(),
        Block::Loading(_) | Block::Choice(_) => false,
    };
    if done {
        rt.block = Block::None;
    }
    done
}

/// Run steps until the script blocks or finishes.
fn run(inner: &Rc<CueInner>) -> VnmarkResult<()> {
    loop {
        let step = {
            let mut rt = inner.runtime.borrow_mut();
            if !rt.started || rt.finished || !unblocked(&mut rt) {
                return Ok(());
            }
            let Some(steps) = inner.sheet.scenes.get(&rt.scene) else {
                return Err(VnmarkError::validation(format!(
                    "unknown scene '{}'",
                    rt.scene
                )));
            };
            match steps.get(rt.pc) {
                Some(step) => {
                    rt.pc += 1;
                    step.clone()
                }
                None => {
                    rt.finished = true;
                    debug!(scene = %rt.scene, "script finished");
                    return Ok(());
                }
            }
        };
        execute_step(inner, step)?;
    }
}

fn execute_step(inner: &Rc<CueInner>, step: CueStep) -> VnmarkResult<()> {
    let block = match step {
        CueStep::Audio {
            name,
            src,
            properties,
        } => {
            let element = Element::Audio(Rc::new(inner.media.create_audio()));
            start_load(inner, name, element, src, properties)?
        }
        CueStep::Video {
            name,
            src,
            properties,
        } => {
            let element = Element::Video(Rc::new(inner.media.create_video()));
            start_load(inner, name, element, src, properties)?
        }
        CueStep::Set {
            name,
            property,
            value,
        } => {
            inner.element(&name)?.object().set_property(&property, value)?;
            Block::None
        }
        CueStep::Wait { frames } => Block::Frames(frames),
        CueStep::WaitPlayback { name } => {
            Block::Playback(inner.element(&name)?.object().create_playback_promise())
        }
        CueStep::Stop { name } => {
            inner.remove_element(&name)?.object().detach();
            Block::None
        }
        CueStep::Snap { name } => {
            inner.element(&name)?.object().snap_playback();
            Block::None
        }
        CueStep::Choice { options } => Block::Choice(options),
        CueStep::Jump { scene } => {
            inner.enter_scene(&scene)?;
            Block::None
        }
        CueStep::End => {
            inner.runtime.borrow_mut().finished = true;
            Block::None
        }
    };
    inner.runtime.borrow_mut().block = block;
    Ok(())
}

/// Start loading an element; completes inline when the load does not need to suspend.
fn start_load(
    inner: &Rc<CueInner>,
    name: String,
    element: Element,
    src: String,
    properties: BTreeMap<String, PropertyValue>,
) -> VnmarkResult<Block> {
    let mut loading = load_element(inner, name, element, src, properties);
    match loading.as_mut().now_or_never() {
        Some(result) => result.map(|()| Block::None),
        None => Ok(Block::Loading(loading)),
    }
}

fn on_frame(inner: &Rc<CueInner>) {
    {
        let mut rt = inner.runtime.borrow_mut();
        if let Block::Frames(n) = &mut rt.block {
            *n = n.saturating_sub(1);
        }
    }
    if let Err(e) = run(inner) {
        inner.runtime.borrow_mut().error = Some(e);
    }
}

fn failed(e: VnmarkError) -> ViewStatus {
    ViewStatus::Loading(futures::future::ready(Err(e)).boxed_local())
}

impl Engine for CuePlayer {
    fn status(&self) -> EngineStatus {
        let rt = self.inner.runtime.borrow();
        if rt.started && (!rt.finished || rt.error.is_some()) {
            EngineStatus::Updating
        } else {
            EngineStatus::Ready
        }
    }

    fn execute(&self, state: EngineState) -> VnmarkResult<()> {
        let scene = state.file_name.as_deref().unwrap_or(DEFAULT_SCENE);
        self.inner.enter_scene(scene)?;
        self.inner.runtime.borrow_mut().started = true;

        let weak: Weak<CueInner> = Rc::downgrade(&self.inner);
        self.inner.media.clock.add_frame_callback(
            self.inner.owner,
            Box::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    on_frame(&inner);
                }
            }),
        );
        if let Err(e) = run(&self.inner) {
            self.inner.runtime.borrow_mut().error = Some(e);
        }
        Ok(())
    }
}

impl View for CuePlayer {
    fn status(&self) -> ViewStatus {
        if let Some(e) = self.inner.runtime.borrow_mut().error.take() {
            return failed(e);
        }
        if let Err(e) = run(&self.inner) {
            return failed(e);
        }

        let mut rt = self.inner.runtime.borrow_mut();
        match std::mem::take(&mut rt.block) {
            Block::Loading(loading) => ViewStatus::Loading(loading),
            Block::Choice(options) => {
                rt.block = Block::Choice(options.clone());
                let inner = self.inner.clone();
                ViewStatus::Choice(ChoiceSelector::new(move |index| {
                    let scene = options.get(index).ok_or_else(|| {
                        VnmarkError::contract(format!(
                            "choice index {index} out of range for {} options",
                            options.len()
                        ))
                    })?;
                    inner.runtime.borrow_mut().block = Block::None;
                    inner.enter_scene(scene)?;
                    run(&inner)
                }))
            }
            other => {
                rt.block = other;
                ViewStatus::Waiting
            }
        }
    }

    fn init(&self) -> LocalBoxFuture<'_, VnmarkResult<()>> {
        futures::future::ready(Ok(())).boxed_local()
    }

    fn destroy(&self) {
        self.inner.media.clock.remove_frame_callback(self.inner.owner);
        let elements = std::mem::take(&mut self.inner.runtime.borrow_mut().elements);
        for (_, element) in elements {
            element.object().detach();
        }
    }
}

/// [`SceneFactory`] creating a fresh [`CuePlayer`] per session.
///
/// Keeps a handle on the most recent player so callers can inspect it (for example to read the
/// decoded video image after rendering a frame).
#[derive(Debug)]
pub struct CueSceneFactory {
    sheet: CueSheet,
    last: RefCell<Option<Rc<CuePlayer>>>,
}

impl CueSceneFactory {
    /// Factory for `sheet`.
    pub fn new(sheet: CueSheet) -> Self {
        Self {
            sheet,
            last: RefCell::new(None),
        }
    }

    /// The sheet scenes are built from.
    pub fn sheet(&self) -> &CueSheet {
        &self.sheet
    }

    /// Player created by the most recent [`SceneFactory::create_scene`] call.
    pub fn last_player(&self) -> Option<Rc<CuePlayer>> {
        self.last.borrow().clone()
    }
}

impl SceneFactory for CueSceneFactory {
    fn create_scene(&self, media: &MediaContext) -> VnmarkResult<Scene> {
        let player = Rc::new(CuePlayer::new(self.sheet.clone(), media.clone()));
        *self.last.borrow_mut() = Some(player.clone());
        Ok(Scene {
            engine: player.clone(),
            view: player,
        })
    }
}
