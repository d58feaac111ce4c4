//! Frame driver: turns engine/view progress into committed frame advances.

use std::rc::Rc;

use tracing::{debug, info};

use crate::{
    clock::FrameClock,
    engine::{Engine, EngineState, EngineStatus, View, ViewStatus},
    foundation::{
        core::{Fps, FrameIndex},
        error::{VnmarkError, VnmarkResult},
        task::{FrameTaskQueue, yield_now},
    },
};

/// Steps the engine and view one frame at a time.
///
/// Loading pauses and choice points are handled inside [`FrameDriver::advance_one_frame`]; the
/// only state that moves time is the view waiting. Predetermined choices are consumed in script
/// order. All methods take `&mut self`, so calls are strictly sequential.
pub struct FrameDriver {
    engine: Rc<dyn Engine>,
    view: Rc<dyn View>,
    clock: Rc<dyn FrameClock>,
    frame_tasks: FrameTaskQueue,
    choices: Vec<usize>,
    next_choice: usize,
}

impl FrameDriver {
    /// Build a driver over an engine/view pair sharing `clock` and `frame_tasks` with the media
    /// adapters.
    pub fn new(
        engine: Rc<dyn Engine>,
        view: Rc<dyn View>,
        clock: Rc<dyn FrameClock>,
        choices: Vec<usize>,
        frame_tasks: FrameTaskQueue,
    ) -> Self {
        Self {
            engine,
            view,
            clock,
            frame_tasks,
            choices,
            next_choice: 0,
        }
    }

    /// Initialize the view, start the engine and give it one tick to begin.
    pub async fn init(&mut self, state: EngineState) -> VnmarkResult<()> {
        self.view.init().await?;
        self.engine.execute(state)?;
        yield_now().await;
        Ok(())
    }

    /// Current frame.
    pub fn frame(&self) -> FrameIndex {
        self.clock.frame()
    }

    /// Frame rate of the underlying clock.
    pub fn fps(&self) -> Fps {
        self.clock.fps()
    }

    /// Number of predetermined choices consumed so far.
    pub fn choices_consumed(&self) -> usize {
        self.next_choice
    }

    /// Advance by at most one frame.
    ///
    /// Returns `false` once the script has finished; `true` after exactly one frame was
    /// committed and every per-frame task queued during that tick has completed.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn advance_one_frame(&mut self) -> VnmarkResult<bool> {
        loop {
            match self.engine.status() {
                EngineStatus::Ready => return Ok(false),
                EngineStatus::Loading(loading) => {
                    debug!("engine loading");
                    loading.await?;
                    yield_now().await;
                }
                EngineStatus::Updating => match self.view.status() {
                    ViewStatus::Loading(loading) => {
                        debug!("view loading");
                        loading.await?;
                        yield_now().await;
                    }
                    ViewStatus::Choice(selector) => {
                        let index = self.next_predetermined_choice()?;
                        debug!(index, "selecting predetermined choice");
                        selector.select(index)?;
                        yield_now().await;
                    }
                    ViewStatus::Waiting => {
                        self.clock.next_frame();
                        yield_now().await;
                        let tasks = self.frame_tasks.take_all();
                        if !tasks.is_empty() {
                            debug!(tasks = tasks.len(), "awaiting frame tasks");
                            futures::future::try_join_all(tasks).await?;
                        }
                        let frame = self.clock.frame();
                        let fps = self.clock.fps();
                        if fps.is_whole_second(frame) {
                            info!("time: {}s", fps.frames_to_secs(frame.0));
                        }
                        return Ok(true);
                    }
                },
            }
        }
    }

    /// Advance until the script finishes; returns the total frame count.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run_to_completion(&mut self) -> VnmarkResult<u64> {
        while self.advance_one_frame().await? {}
        Ok(self.clock.frame().0)
    }

    /// Advance to `target`, stopping early if the script finishes first.
    ///
    /// Returns the frame actually reached, which is authoritative. Seeking backwards fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn advance_to(&mut self, target: FrameIndex) -> VnmarkResult<FrameIndex> {
        let current = self.clock.frame();
        if target < current {
            return Err(VnmarkError::validation(format!(
                "new frame {target} is less than current frame {current}"
            )));
        }
        if target == current {
            return Ok(current);
        }
        while self.clock.frame() < target && self.advance_one_frame().await? {}
        let reached = self.clock.frame();
        if reached < target {
            debug!(reached = reached.0, "script finished before target frame");
        }
        Ok(reached)
    }

    /// Tear down the view, then the clock.
    pub fn destroy(&self) {
        self.view.destroy();
        self.clock.destroy();
    }

    fn next_predetermined_choice(&mut self) -> VnmarkResult<usize> {
        let index = self.choices.get(self.next_choice).copied().ok_or_else(|| {
            VnmarkError::contract(format!(
                "choice #{} reached but only {} predetermined choices were supplied",
                self.next_choice + 1,
                self.choices.len()
            ))
        })?;
        self.next_choice += 1;
        Ok(index)
    }
}

impl std::fmt::Debug for FrameDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDriver")
            .field("frame", &self.clock.frame())
            .field("choices", &self.choices)
            .field("next_choice", &self.next_choice)
            .field("frame_tasks", &self.frame_tasks)
            .finish()
    }
}
