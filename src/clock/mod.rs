//! Discrete frame clock: the single source of time for a render.
//!
//! Time only moves when the frame driver calls [`FrameClock::next_frame`]. Objects that need to
//! follow time register one callback each, keyed by an opaque [`CallbackOwner`] handle.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use futures::{FutureExt as _, channel::oneshot, future::{self, LocalBoxFuture}};

use crate::foundation::core::{Fps, FrameIndex};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Opaque identity used to key frame callback registrations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackOwner(u64);

impl CallbackOwner {
    /// Allocate a process-unique owner handle.
    pub fn allocate() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Callback invoked with the new frame after every clock advance.
pub type FrameCallback = Box<dyn FnMut(FrameIndex)>;

/// Frame clock contract consumed by the driver and the media adapters.
pub trait FrameClock {
    /// Current frame.
    fn frame(&self) -> FrameIndex;

    /// Fixed frame rate.
    fn fps(&self) -> Fps;

    /// Advance by exactly one frame, settle due timeouts, then notify callbacks.
    fn next_frame(&self);

    /// Register (or replace) the callback owned by `owner`.
    fn add_frame_callback(&self, owner: CallbackOwner, callback: FrameCallback);

    /// Remove the callback owned by `owner`; a no-op when none is registered.
    fn remove_frame_callback(&self, owner: CallbackOwner);

    /// Future settling once `millis` of clock time have elapsed.
    fn create_timeout(&self, millis: f64) -> LocalBoxFuture<'static, ()>;

    /// Drop all callbacks and settle pending timeouts.
    fn destroy(&self) {}
}

struct PendingTimeout {
    deadline: FrameIndex,
    tx: oneshot::Sender<()>,
}

type CallbackSlot = Rc<RefCell<FrameCallback>>;

/// Deterministic, manually stepped [`FrameClock`].
///
/// Timeouts due at the new frame settle before any callback runs, so a callback observes them
/// as finished. Callbacks run in registration order. A callback may add or remove registrations while the
/// clock is dispatching; removed callbacks that have not run yet in this tick are skipped.
pub struct SteppedClock {
    fps: Fps,
    frame: Cell<FrameIndex>,
    callbacks: RefCell<Vec<(CallbackOwner, CallbackSlot)>>,
    timeouts: RefCell<Vec<PendingTimeout>>,
}

impl SteppedClock {
    /// Create a clock at frame 0.
    pub fn new(fps: Fps) -> Self {
        Self {
            fps,
            frame: Cell::new(FrameIndex(0)),
            callbacks: RefCell::new(Vec::new()),
            timeouts: RefCell::new(Vec::new()),
        }
    }

    /// Number of registered frame callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Whether `owner` currently has a registered callback.
    pub fn has_callback(&self, owner: CallbackOwner) -> bool {
        self.callbacks.borrow().iter().any(|(o, _)| *o == owner)
    }

    /// Number of timeouts that have not settled yet.
    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.borrow().len()
    }

    fn settle_due_timeouts(&self, frame: FrameIndex) {
        let due: Vec<PendingTimeout> = {
            let mut timeouts = self.timeouts.borrow_mut();
            let (due, pending) = std::mem::take(&mut *timeouts)
                .into_iter()
                .partition(|t| t.deadline <= frame);
            *timeouts = pending;
            due
        };
        for t in due {
            let _ = t.tx.send(());
        }
    }
}

impl std::fmt::Debug for SteppedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteppedClock")
            .field("fps", &self.fps)
            .field("frame", &self.frame.get())
            .field("callbacks", &self.callback_count())
            .field("timeouts", &self.pending_timeouts())
            .finish()
    }
}

impl FrameClock for SteppedClock {
    fn frame(&self) -> FrameIndex {
        self.frame.get()
    }

    fn fps(&self) -> Fps {
        self.fps
    }

    fn next_frame(&self) {
        let frame = self.frame.get().next();
        self.frame.set(frame);
        self.settle_due_timeouts(frame);

        let snapshot: Vec<(CallbackOwner, CallbackSlot)> = self.callbacks.borrow().clone();
        for (owner, slot) in snapshot {
            let still_registered = self
                .callbacks
                .borrow()
                .iter()
                .any(|(o, s)| *o == owner && Rc::ptr_eq(s, &slot));
            if !still_registered {
                continue;
            }
            let mut callback = slot.borrow_mut();
            (*callback)(frame);
        }
    }

    fn add_frame_callback(&self, owner: CallbackOwner, callback: FrameCallback) {
        let slot = Rc::new(RefCell::new(callback));
        let mut callbacks = self.callbacks.borrow_mut();
        if let Some(existing) = callbacks.iter_mut().find(|(o, _)| *o == owner) {
            existing.1 = slot;
        } else {
            callbacks.push((owner, slot));
        }
    }

    fn remove_frame_callback(&self, owner: CallbackOwner) {
        self.callbacks.borrow_mut().retain(|(o, _)| *o != owner);
    }

    fn create_timeout(&self, millis: f64) -> LocalBoxFuture<'static, ()> {
        let frames = self.fps.millis_to_frames_ceil(millis);
        if frames == 0 {
            return future::ready(()).boxed_local();
        }
        let (tx, rx) = oneshot::channel();
        self.timeouts.borrow_mut().push(PendingTimeout {
            deadline: FrameIndex(self.frame.get().0.saturating_add(frames)),
            tx,
        });
        // A dropped sender also counts as settled.
        rx.map(|_| ()).boxed_local()
    }

    fn destroy(&self) {
        self.callbacks.borrow_mut().clear();
        self.timeouts.borrow_mut().clear();
    }
}
