use std::{
    cell::{Cell, RefCell},
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use futures::future::LocalBoxFuture;

use crate::foundation::error::VnmarkResult;

/// Future returned by [`yield_now`].
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Give the executor one scheduling tick before continuing.
///
/// Pending exactly once and wakes itself, so any other local task queued on the same executor
/// gets polled before the caller resumes.
pub fn yield_now() -> YieldNow {
    YieldNow::default()
}

/// Asynchronous work queued during a clock tick that must finish before the tick is settled.
pub type FrameTask = LocalBoxFuture<'static, VnmarkResult<()>>;

/// Shared queue of per-frame tasks.
///
/// Media adapters push into it from their frame callbacks; the frame driver drains and awaits it
/// as one batch once per committed frame. Clones share the same queue.
#[derive(Clone, Default)]
pub struct FrameTaskQueue {
    tasks: Rc<RefCell<Vec<FrameTask>>>,
    pushed_total: Rc<Cell<u64>>,
}

impl FrameTaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task for the current tick.
    pub fn push(&self, task: FrameTask) {
        self.tasks.borrow_mut().push(task);
        self.pushed_total.set(self.pushed_total.get() + 1);
    }

    /// Remove and return every queued task.
    pub fn take_all(&self) -> Vec<FrameTask> {
        std::mem::take(&mut *self.tasks.borrow_mut())
    }

    /// Number of tasks currently queued.
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Whether no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Total number of tasks ever pushed into this queue.
    pub fn pushed_total(&self) -> u64 {
        self.pushed_total.get()
    }
}

impl std::fmt::Debug for FrameTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTaskQueue")
            .field("queued", &self.len())
            .field("pushed_total", &self.pushed_total.get())
            .finish()
    }
}
