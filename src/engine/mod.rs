//! Contracts of the external script engine and view consumed by the frame driver.

use futures::future::LocalBoxFuture;

use crate::foundation::error::VnmarkResult;

/// Future the driver awaits while the engine or view is loading.
pub type LoadingFuture = LocalBoxFuture<'static, VnmarkResult<()>>;

/// Execution status of the script engine.
pub enum EngineStatus {
    /// The script has no more work.
    Ready,
    /// The engine is loading; await the future, then poll again.
    Loading(LoadingFuture),
    /// The script is running; consult the view.
    Updating,
}

impl EngineStatus {
    /// Tag name, for logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Loading(_) => "loading",
            Self::Updating => "updating",
        }
    }
}

impl std::fmt::Debug for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One-shot callback resolving a pending choice.
pub struct ChoiceSelector(Box<dyn FnOnce(usize) -> VnmarkResult<()>>);

impl ChoiceSelector {
    /// Wrap a selection callback.
    pub fn new(select: impl FnOnce(usize) -> VnmarkResult<()> + 'static) -> Self {
        Self(Box::new(select))
    }

    /// Pick option `index`.
    pub fn select(self, index: usize) -> VnmarkResult<()> {
        (self.0)(index)
    }
}

/// Presentation status of the view.
pub enum ViewStatus {
    /// The view is loading; await the future, then poll again.
    Loading(LoadingFuture),
    /// The script waits for the user to pick an option.
    Choice(ChoiceSelector),
    /// Nothing to do until time advances.
    Waiting,
}

impl ViewStatus {
    /// Tag name, for logs.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Loading(_) => "loading",
            Self::Choice(_) => "choice",
            Self::Waiting => "waiting",
        }
    }
}

impl std::fmt::Debug for ViewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
/// Partial initial state handed to [`Engine::execute`].
pub struct EngineState {
    /// Script file (scene) to start from; the engine's default when `None`.
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Script interpreter with a pausable execution status.
pub trait Engine {
    /// Current execution status.
    fn status(&self) -> EngineStatus;

    /// Start executing from `state`.
    fn execute(&self, state: EngineState) -> VnmarkResult<()>;
}

/// Presentation layer that turns engine output into element objects.
///
/// A future returned in [`ViewStatus::Loading`] must be awaited before the status is read again.
pub trait View {
    /// Current presentation status.
    fn status(&self) -> ViewStatus;

    /// Prepare the view before the engine starts.
    fn init(&self) -> LocalBoxFuture<'_, VnmarkResult<()>>;

    /// Release every element the view still holds.
    fn destroy(&self) {}
}
