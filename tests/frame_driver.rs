use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use futures::{FutureExt as _, executor::block_on, future::LocalBoxFuture};
use vnmark_render::{
    CallbackOwner, ChoiceSelector, Engine, EngineState, EngineStatus, Fps, FrameClock,
    FrameDriver, FrameIndex, FrameTaskQueue, SteppedClock, View, ViewStatus, VnmarkError,
    VnmarkResult, yield_now,
};

#[derive(Clone, Copy, Debug)]
enum Step {
    Wait(u64),
    Load,
    FailLoad,
    Choice(usize),
}

/// Engine and view in one: plays a fixed list of steps against the clock.
struct Scripted {
    clock: Rc<SteppedClock>,
    steps: RefCell<VecDeque<Step>>,
    wait_until: Cell<Option<FrameIndex>>,
    started: Cell<bool>,
    loads: Rc<Cell<u32>>,
    picks: Rc<RefCell<Vec<usize>>>,
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl Scripted {
    fn new(clock: Rc<SteppedClock>, steps: &[Step]) -> Rc<Self> {
        Rc::new(Self {
            clock,
            steps: RefCell::new(steps.iter().copied().collect()),
            wait_until: Cell::new(None),
            started: Cell::new(false),
            loads: Rc::new(Cell::new(0)),
            picks: Rc::new(RefCell::new(Vec::new())),
            log: Rc::new(RefCell::new(Vec::new())),
        })
    }

    fn waiting(&self) -> bool {
        self.wait_until
            .get()
            .is_some_and(|until| self.clock.frame() < until)
    }
}

impl Engine for Scripted {
    fn status(&self) -> EngineStatus {
        if self.started.get() && (self.waiting() || !self.steps.borrow().is_empty()) {
            EngineStatus::Updating
        } else {
            EngineStatus::Ready
        }
    }

    fn execute(&self, _state: EngineState) -> VnmarkResult<()> {
        self.log.borrow_mut().push("execute");
        self.started.set(true);
        Ok(())
    }
}

impl View for Scripted {
    fn status(&self) -> ViewStatus {
        if self.waiting() {
            return ViewStatus::Waiting;
        }
        let Some(step) = self.steps.borrow_mut().pop_front() else {
            return ViewStatus::Waiting;
        };
        match step {
            Step::Wait(n) => {
                self.wait_until
                    .set(Some(FrameIndex(self.clock.frame().0 + n)));
                ViewStatus::Waiting
            }
            Step::Load => {
                let loads = self.loads.clone();
                ViewStatus::Loading(
                    async move {
                        yield_now().await;
                        loads.set(loads.get() + 1);
                        Ok(())
                    }
                    .boxed_local(),
                )
            }
            Step::FailLoad => ViewStatus::Loading(
                futures::future::ready(Err(VnmarkError::media("broken resource"))).boxed_local(),
            ),
            Step::Choice(options) => {
                let picks = self.picks.clone();
                ViewStatus::Choice(ChoiceSelector::new(move |index| {
                    if index >= options {
                        return Err(VnmarkError::contract(format!(
                            "choice index {index} out of range"
                        )));
                    }
                    picks.borrow_mut().push(index);
                    Ok(())
                }))
            }
        }
    }

    fn init(&self) -> LocalBoxFuture<'_, VnmarkResult<()>> {
        async move {
            self.log.borrow_mut().push("init");
            Ok(())
        }
        .boxed_local()
    }

    fn destroy(&self) {
        self.log.borrow_mut().push("destroy");
    }
}

fn driver(steps: &[Step], choices: Vec<usize>) -> (FrameDriver, Rc<Scripted>, Rc<SteppedClock>) {
    let clock = Rc::new(SteppedClock::new(Fps::integer(30).unwrap()));
    let scripted = Scripted::new(clock.clone(), steps);
    let mut driver = FrameDriver::new(
        scripted.clone(),
        scripted.clone(),
        clock.clone(),
        choices,
        FrameTaskQueue::new(),
    );
    block_on(driver.init(EngineState::default())).unwrap();
    (driver, scripted, clock)
}

#[test]
fn init_prepares_view_before_engine() {
    let (_driver, scripted, _) = driver(&[], vec![]);
    assert_eq!(*scripted.log.borrow(), vec!["init", "execute"]);
}

#[test]
fn run_to_completion_counts_frames_and_awaits_loads() {
    let (mut d, scripted, _) = driver(&[Step::Wait(3), Step::Load, Step::Wait(2)], vec![]);
    let frames = block_on(d.run_to_completion()).unwrap();
    assert_eq!(frames, 5);
    assert_eq!(scripted.loads.get(), 1);
    assert!(!block_on(d.advance_one_frame()).unwrap());
}

#[test]
fn completion_is_deterministic() {
    let steps = [Step::Wait(4), Step::Choice(2), Step::Load, Step::Wait(6)];
    let a = block_on(driver(&steps, vec![1]).0.run_to_completion()).unwrap();
    let b = block_on(driver(&steps, vec![1]).0.run_to_completion()).unwrap();
    assert_eq!(a, 10);
    assert_eq!(a, b);
}

#[test]
fn advance_to_same_frame_is_a_no_op() {
    let (mut d, _, clock) = driver(&[Step::Wait(10)], vec![]);
    assert_eq!(block_on(d.advance_to(FrameIndex(4))).unwrap(), FrameIndex(4));
    assert_eq!(block_on(d.advance_to(FrameIndex(4))).unwrap(), FrameIndex(4));
    assert_eq!(clock.frame(), FrameIndex(4));
}

#[test]
fn advance_to_rejects_seeking_backwards() {
    let (mut d, _, _) = driver(&[Step::Wait(10)], vec![]);
    block_on(d.advance_to(FrameIndex(3))).unwrap();
    let err = block_on(d.advance_to(FrameIndex(1))).unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation error: new frame 1 is less than current frame 3"
    );
}

#[test]
fn advance_to_stops_when_script_finishes() {
    let (mut d, _, _) = driver(&[Step::Wait(4)], vec![]);
    assert_eq!(block_on(d.advance_to(FrameIndex(10))).unwrap(), FrameIndex(4));
    assert_eq!(d.frame(), FrameIndex(4));
}

#[test]
fn predetermined_choices_are_consumed_in_order() {
    let steps = [
        Step::Choice(2),
        Step::Wait(1),
        Step::Choice(3),
        Step::Wait(1),
    ];
    let (mut d, scripted, _) = driver(&steps, vec![1, 2]);
    block_on(d.run_to_completion()).unwrap();
    assert_eq!(*scripted.picks.borrow(), vec![1, 2]);
    assert_eq!(d.choices_consumed(), 2);
}

#[test]
fn exhausted_choices_are_an_error() {
    let (mut d, _, _) = driver(&[Step::Wait(1), Step::Choice(2)], vec![]);
    let err = block_on(d.run_to_completion()).unwrap_err();
    assert!(err.to_string().starts_with("contract violation:"));
    assert!(err.to_string().contains("predetermined choices"));
}

#[test]
fn selector_errors_propagate() {
    let (mut d, _, _) = driver(&[Step::Choice(2)], vec![5]);
    let err = block_on(d.advance_one_frame()).unwrap_err();
    assert!(err.to_string().contains("out of range"));
}

#[test]
fn loading_failures_propagate() {
    let (mut d, _, clock) = driver(&[Step::Wait(2), Step::FailLoad, Step::Wait(2)], vec![]);
    let err = block_on(d.run_to_completion()).unwrap_err();
    assert!(err.to_string().starts_with("media error:"));
    assert_eq!(clock.frame(), FrameIndex(2));
}

#[test]
fn frame_tasks_are_awaited_before_the_frame_commits() {
    let clock = Rc::new(SteppedClock::new(Fps::integer(30).unwrap()));
    let scripted = Scripted::new(clock.clone(), &[Step::Wait(3)]);
    let tasks = FrameTaskQueue::new();
    let finished = Rc::new(RefCell::new(Vec::new()));
    {
        let tasks = tasks.clone();
        let finished = finished.clone();
        clock.add_frame_callback(
            CallbackOwner::allocate(),
            Box::new(move |frame| {
                let finished = finished.clone();
                tasks.push(
                    async move {
                        yield_now().await;
                        finished.borrow_mut().push(frame.0);
                        Ok(())
                    }
                    .boxed_local(),
                );
            }),
        );
    }
    let mut d = FrameDriver::new(scripted.clone(), scripted, clock, vec![], tasks.clone());
    block_on(async {
        d.init(EngineState::default()).await?;
        assert!(d.advance_one_frame().await?);
        assert_eq!(*finished.borrow(), vec![1]);
        assert!(d.advance_one_frame().await?);
        assert_eq!(*finished.borrow(), vec![1, 2]);
        Ok::<_, VnmarkError>(())
    })
    .unwrap();
    assert!(tasks.is_empty());
    assert_eq!(tasks.pushed_total(), 2);
}

#[test]
fn failing_frame_task_aborts_the_advance() {
    let clock = Rc::new(SteppedClock::new(Fps::integer(30).unwrap()));
    let scripted = Scripted::new(clock.clone(), &[Step::Wait(3)]);
    let tasks = FrameTaskQueue::new();
    {
        let tasks = tasks.clone();
        clock.add_frame_callback(
            CallbackOwner::allocate(),
            Box::new(move |_| {
                tasks.push(
                    futures::future::ready(Err(VnmarkError::media("decode failed")))
                        .boxed_local(),
                );
            }),
        );
    }
    let mut d = FrameDriver::new(scripted.clone(), scripted, clock, vec![], tasks);
    block_on(d.init(EngineState::default())).unwrap();
    let err = block_on(d.advance_one_frame()).unwrap_err();
    assert_eq!(err.to_string(), "media error: decode failed");
}

#[test]
fn destroy_tears_down_view_then_clock() {
    let (d, scripted, clock) = driver(&[Step::Wait(3)], vec![]);
    clock.add_frame_callback(CallbackOwner::allocate(), Box::new(|_| {}));
    let mut timeout = clock.create_timeout(10_000.0);
    d.destroy();
    assert_eq!(scripted.log.borrow().last(), Some(&"destroy"));
    assert_eq!(clock.callback_count(), 0);
    assert!((&mut timeout).now_or_never().is_some());
}
