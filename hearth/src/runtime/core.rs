use super::current;
use super::exception::ExceptionRecord;
use super::queue::ReadyQueue;
use super::task::core::TaskCore;
use super::task::handle::Outcome;
use super::task::state::TaskId;
use super::task::waker::make_waker;
use super::task::{JoinHandle, Task};
use super::timer::{TimerEntry, TimerShared};
use crate::asyncgen::Finalize;
use crate::config::LoopConfig;
use crate::context::{Context, copy_context};
use crate::error::{Error, Fault, JoinError};
use crate::utils::{Slab, panic_message};

use std::cell::{Cell, RefCell};
use std::collections::BinaryHeap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

const INITIAL_TASK_CAPACITY: usize = 64;

/// Smallest timer queue length that triggers a sweep of cancelled timers.
const TIMER_PURGE_THRESHOLD: usize = 64;

/// Callback receiving the failures nobody is awaiting.
pub(crate) type ExceptionHandler = Rc<dyn Fn(&EventLoop, &ExceptionRecord)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Running,
    Closed,
}

pub(crate) struct LoopInner {
    state: Cell<LoopState>,

    debug: Cell<bool>,

    slow_poll_threshold: Cell<Duration>,

    /// Every task that has not settled yet, keyed by the key their waker
    /// carries.
    tasks: RefCell<Slab<Rc<TaskCore>>>,

    /// Keys of tasks woken since the last drain.
    ready: Arc<ReadyQueue>,

    timers: RefCell<BinaryHeap<TimerEntry>>,

    /// Timer queue length at which cancelled entries are swept out.
    timer_purge_at: Cell<usize>,

    exception_handler: RefCell<Option<ExceptionHandler>>,

    /// Asynchronous generators first iterated on this loop.
    asyncgens: RefCell<Vec<Weak<dyn Finalize>>>,

    asyncgens_shutdown_called: Cell<bool>,
}

impl LoopInner {
    /// Reports task polls slower than the configured threshold, in debug
    /// mode only.
    pub(crate) fn observe_poll(&self, task: TaskId, elapsed: Duration) {
        if self.debug.get() && elapsed >= self.slow_poll_threshold.get() {
            warn!(
                %task,
                elapsed_ms = elapsed.as_millis() as u64,
                "executing task took too long"
            );
        }
    }
}

/// A single-threaded event loop.
///
/// `EventLoop` owns the tasks scheduled on it, the timers they wait on
/// and the registry of asynchronous generators first iterated on it. It
/// is driven by the thread that calls
/// [`run_until_complete`](Self::run_until_complete), and only while that
/// call lasts.
///
/// Cloning an `EventLoop` clones the handle; all clones drive the same
/// loop.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl EventLoop {
    /// Creates a new loop, configured from the `HEARTH_*` environment
    /// variables.
    ///
    /// An invalid variable is logged and the defaults are used instead.
    pub fn new() -> Self {
        let config = LoopConfig::from_env().unwrap_or_else(|err| {
            warn!(%err, "ignoring invalid event loop configuration");
            LoopConfig::default()
        });

        Self::with_config(config)
    }

    pub fn with_config(config: LoopConfig) -> Self {
        let inner = LoopInner {
            state: Cell::new(LoopState::Idle),
            debug: Cell::new(config.debug),
            slow_poll_threshold: Cell::new(config.slow_poll_threshold),
            tasks: RefCell::new(Slab::new(INITIAL_TASK_CAPACITY)),
            ready: Arc::new(ReadyQueue::new()),
            timers: RefCell::new(BinaryHeap::new()),
            timer_purge_at: Cell::new(TIMER_PURGE_THRESHOLD),
            exception_handler: RefCell::new(None),
            asyncgens: RefCell::new(Vec::new()),
            asyncgens_shutdown_called: Cell::new(false),
        };

        debug!(
            debug = config.debug,
            slow_poll_ms = config.slow_poll_threshold.as_millis() as u64,
            "event loop created"
        );

        Self {
            inner: Rc::new(inner),
        }
    }

    pub(crate) fn from_inner(inner: Rc<LoopInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<LoopInner> {
        Rc::downgrade(&self.inner)
    }

    /// Returns `true` if both handles drive the same loop.
    pub fn ptr_eq(&self, other: &EventLoop) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.get() == LoopState::Running
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.get() == LoopState::Closed
    }

    pub fn get_debug(&self) -> bool {
        self.inner.debug.get()
    }

    /// Enables or disables debug mode.
    ///
    /// In debug mode every task poll slower than the configured threshold
    /// is logged.
    pub fn set_debug(&self, enabled: bool) {
        self.inner.debug.set(enabled);
    }

    /// Schedules `future` as a new task with a copy of the current context.
    ///
    /// # Panics
    ///
    /// Panics if the loop is closed.
    pub fn create_task<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        match self.try_create_task_in(future, copy_context()) {
            Ok(handle) => handle,
            Err(err) => panic!("cannot schedule a task: {err}"),
        }
    }

    /// Schedules `future` as a new task running in `context`.
    ///
    /// The task is polled for the first time on the next iteration of the
    /// loop.
    pub fn try_create_task_in<F>(
        &self,
        future: F,
        context: Context,
    ) -> Result<JoinHandle<F::Output>, Error>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        if self.is_closed() {
            return Err(Error::LoopClosed);
        }

        let slot = Rc::new(RefCell::new(None));
        let output = slot.clone();
        let wrapped = async move {
            let value = future.await;
            *output.borrow_mut() = Some(value);
        };

        let core = Rc::new(TaskCore::new(Box::pin(wrapped), context, self.downgrade()));
        let key = self.inner.tasks.borrow_mut().insert(core.clone());
        core.bind(make_waker(key, core.queued.clone(), self.inner.ready.clone()));
        trace!(task = %core.id, key, "task spawned");

        Ok(JoinHandle::new(Task::from_core(core), slot))
    }

    /// Returns every task of this loop that has not settled yet.
    pub fn all_tasks(&self) -> Vec<Task> {
        self.inner
            .tasks
            .borrow()
            .iter()
            .filter(|core| !core.is_done())
            .map(|core| Task::from_core(core.clone()))
            .collect()
    }

    /// Runs `future` as a task until it settles and returns its output.
    ///
    /// A panic of the future is re-raised on the calling thread. Other
    /// tasks scheduled on the loop make progress meanwhile, and are left
    /// where they are once the future is done.
    ///
    /// # Errors
    ///
    /// - [`Error::LoopClosed`] if the loop is closed,
    /// - [`Error::Reentrancy`] if a loop is already being driven on this
    ///   thread,
    /// - [`Error::Cancelled`] if the task was cancelled.
    pub fn run_until_complete<F>(&self, future: F) -> Result<F::Output, Error>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.check_can_run("EventLoop::run_until_complete()")?;

        let handle = self.try_create_task_in(future, copy_context())?;
        self.run_until(handle.task())?;

        match handle.into_outcome() {
            Outcome::Completed(value) => Ok(value),
            Outcome::Panicked(payload) => panic::resume_unwind(payload),
            Outcome::Cancelled | Outcome::Pending => Err(Error::Cancelled),
        }
    }

    /// Drives the loop until `task` settles.
    ///
    /// How the task settled is read from `task` afterwards.
    ///
    /// # Errors
    ///
    /// - [`Error::LoopClosed`] if the loop is closed,
    /// - [`Error::Reentrancy`] if a loop is already being driven on this
    ///   thread.
    pub fn run_until(&self, task: &Task) -> Result<(), Error> {
        self.check_can_run("EventLoop::run_until()")?;

        let _running = self.enter_running();

        while !task.is_done() {
            self.run_once();
        }

        Ok(())
    }

    fn check_can_run(&self, entry: &'static str) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::LoopClosed);
        }
        if self.is_running() || current::driving() {
            return Err(Error::Reentrancy { entry });
        }
        Ok(())
    }

    fn enter_running(&self) -> RunningGuard<'_> {
        self.inner.state.set(LoopState::Running);
        RunningGuard {
            inner: &self.inner,
            _current: current::enter_loop(self),
        }
    }

    /// Runs one iteration of the loop.
    ///
    /// Due timers fire first, then every task woken so far is polled once.
    /// With nothing to poll, the thread parks until the next timer deadline
    /// or the next wake.
    fn run_once(&self) {
        self.fire_timers();

        let batch = self.inner.ready.drain();
        if batch.is_empty() {
            let timeout = self.next_timer_delay();
            self.inner.ready.park(timeout);
            return;
        }

        for key in batch {
            let Some(task) = self.inner.tasks.borrow().get(key).cloned() else {
                continue;
            };

            if task.run(&self.inner) {
                let removed = self.inner.tasks.borrow_mut().remove(key);
                drop(removed);
            }
        }
    }

    fn fire_timers(&self) {
        let now = Instant::now();

        loop {
            let entry = {
                let mut timers = self.inner.timers.borrow_mut();
                match timers.peek() {
                    Some(entry) if entry.deadline <= now => timers.pop(),
                    _ => None,
                }
            };

            let Some(entry) = entry else {
                break;
            };
            entry.shared.fire();
        }
    }

    fn next_timer_delay(&self) -> Option<Duration> {
        let mut timers = self.inner.timers.borrow_mut();

        while timers.peek().is_some_and(|entry| entry.shared.is_cancelled()) {
            timers.pop();
        }

        timers
            .peek()
            .map(|entry| entry.deadline.saturating_duration_since(Instant::now()))
    }

    /// Queues a timer.
    ///
    /// Cancelled timers are normally discarded once they reach the front
    /// of the queue. When the queue doubles in size since the last sweep,
    /// they are swept out wherever they are.
    pub(crate) fn register_timer(&self, deadline: Instant, shared: Rc<TimerShared>) {
        let mut timers = self.inner.timers.borrow_mut();

        if timers.len() >= self.inner.timer_purge_at.get() {
            let before = timers.len();
            timers.retain(|entry| !entry.shared.is_cancelled());
            trace!(
                swept = before - timers.len(),
                remaining = timers.len(),
                "swept cancelled timers"
            );
            self.inner
                .timer_purge_at
                .set((timers.len() * 2).max(TIMER_PURGE_THRESHOLD));
        }

        timers.push(TimerEntry { deadline, shared });
    }

    /// Sets the handler receiving failures nobody is awaiting.
    pub fn set_exception_handler<H>(&self, handler: H)
    where
        H: Fn(&EventLoop, &ExceptionRecord) + 'static,
    {
        *self.inner.exception_handler.borrow_mut() = Some(Rc::new(handler));
    }

    /// Restores the default handler.
    pub fn clear_exception_handler(&self) {
        let handler = self.inner.exception_handler.borrow_mut().take();
        drop(handler);
    }

    /// Delivers `record` to the exception handler.
    ///
    /// A panicking custom handler is logged and the record is passed to
    /// the default handler instead.
    pub fn call_exception_handler(&self, record: &ExceptionRecord) {
        let handler = self.inner.exception_handler.borrow().clone();

        let Some(handler) = handler else {
            self.default_exception_handler(record);
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(self, record))) {
            error!(
                panic = %panic_message(&*payload),
                "unhandled error in exception handler"
            );
            self.default_exception_handler(record);
        }
    }

    /// Logs `record` at error level.
    pub fn default_exception_handler(&self, record: &ExceptionRecord) {
        ExceptionRecord::log(record);
    }

    /// Registers an asynchronous generator first iterated on this loop.
    pub(crate) fn register_asyncgen(&self, generator: Weak<dyn Finalize>) {
        if self.inner.asyncgens_shutdown_called.get() {
            warn!("asynchronous generator was scheduled after the loop shut its generators down");
        }

        let mut asyncgens = self.inner.asyncgens.borrow_mut();
        asyncgens.retain(|g| g.strong_count() > 0);
        asyncgens.push(generator);
    }

    /// Closes every asynchronous generator still open on this loop.
    ///
    /// Generators are closed concurrently, each in its own task. Failures
    /// are reported through the exception handler, never returned.
    pub fn shutdown_async_generators(&self) -> impl Future<Output = ()> + 'static {
        let event_loop = self.clone();

        async move {
            event_loop.inner.asyncgens_shutdown_called.set(true);

            let generators: Vec<Rc<dyn Finalize>> = event_loop
                .inner
                .asyncgens
                .borrow_mut()
                .drain(..)
                .filter_map(|g| g.upgrade())
                .filter(|g| !g.is_finalized())
                .collect();

            if generators.is_empty() {
                return;
            }

            debug!(count = generators.len(), "closing asynchronous generators");

            let closing: Vec<_> = generators
                .into_iter()
                .map(|generator| {
                    let name = generator.describe();
                    (name, event_loop.create_task(generator.aclose_boxed()))
                })
                .collect();

            for (name, handle) in closing {
                let fault = match handle.await {
                    Ok(Ok(())) | Err(JoinError::Cancelled) => continue,
                    Ok(Err(fault)) => fault,
                    Err(JoinError::Panicked(message)) => Fault::Panicked(message),
                };

                let record = ExceptionRecord::new(format!(
                    "an error occurred during closing of asynchronous generator {name}"
                ))
                .with_exception(fault)
                .with_asyncgen(name);
                event_loop.call_exception_handler(&record);
            }
        }
    }

    /// Closes the loop.
    ///
    /// Tasks that have not settled are dropped without being polled again
    /// and settle as cancelled. Closing a closed loop does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoopRunning`] if the loop is being driven.
    pub fn close(&self) -> Result<(), Error> {
        match self.inner.state.get() {
            LoopState::Running => return Err(Error::LoopRunning),
            LoopState::Closed => return Ok(()),
            LoopState::Idle => {}
        }

        debug!("closing event loop");
        self.inner.state.set(LoopState::Closed);

        let tasks = self.inner.tasks.borrow_mut().drain();
        for task in &tasks {
            task.abandon();
        }
        drop(tasks);

        self.inner.ready.clear();
        let timers = std::mem::take(&mut *self.inner.timers.borrow_mut());
        drop(timers);
        let asyncgens = std::mem::take(&mut *self.inner.asyncgens.borrow_mut());
        drop(asyncgens);

        Ok(())
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("state", &self.inner.state.get())
            .field("debug", &self.inner.debug.get())
            .field("tasks", &self.inner.tasks.borrow().len())
            .finish()
    }
}

/// Marks the loop as running for the duration of a drive.
struct RunningGuard<'a> {
    inner: &'a LoopInner,
    _current: current::LoopGuard,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.inner.state.get() == LoopState::Running {
            self.inner.state.set(LoopState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::sleep;

    #[test]
    fn runs_a_future_to_completion() {
        let event_loop = EventLoop::new();
        assert_eq!(event_loop.run_until_complete(async { 42 }), Ok(42));
        assert!(!event_loop.is_running());
        event_loop.close().unwrap();
    }

    #[test]
    fn closed_loop_refuses_work() {
        let event_loop = EventLoop::new();
        event_loop.close().unwrap();
        event_loop.close().unwrap();

        assert!(event_loop.is_closed());
        assert_eq!(
            event_loop.run_until_complete(async {}),
            Err(Error::LoopClosed)
        );
    }

    #[test]
    fn nested_drive_is_refused() {
        let event_loop = EventLoop::new();
        let inner = event_loop.clone();

        let nested = event_loop
            .run_until_complete(async move { inner.run_until_complete(async {}) })
            .unwrap();

        assert!(matches!(nested, Err(Error::Reentrancy { .. })));
        event_loop.close().unwrap();
    }

    #[test]
    fn cannot_close_while_running() {
        let event_loop = EventLoop::new();
        let inner = event_loop.clone();

        let closed = event_loop
            .run_until_complete(async move { inner.close() })
            .unwrap();

        assert_eq!(closed, Err(Error::LoopRunning));
        event_loop.close().unwrap();
    }

    #[test]
    fn drives_until_a_scheduled_task_settles() {
        let event_loop = EventLoop::new();
        let handle = event_loop.create_task(async {
            crate::yield_now().await.ok();
            7
        });

        event_loop.run_until(handle.task()).unwrap();

        assert!(handle.is_done());
        assert!(event_loop.all_tasks().is_empty());
        event_loop.close().unwrap();
    }

    #[test]
    fn abandoned_sleeps_do_not_pile_up() {
        let event_loop = EventLoop::new();

        event_loop
            .run_until_complete(async {
                for _ in 0..1_000 {
                    let mut nap = std::pin::pin!(sleep(Duration::from_secs(3_600)));
                    std::future::poll_fn(|cx| {
                        assert!(nap.as_mut().poll(cx).is_pending());
                        std::task::Poll::Ready(())
                    })
                    .await;
                }
            })
            .unwrap();

        assert!(event_loop.inner.timers.borrow().len() <= TIMER_PURGE_THRESHOLD);
        event_loop.close().unwrap();
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let event_loop = EventLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let log = order.clone();
        event_loop
            .run_until_complete(async move {
                let slow = {
                    let log = log.clone();
                    crate::spawn(async move {
                        sleep(Duration::from_millis(30)).await.ok();
                        log.borrow_mut().push("slow");
                    })
                };
                let fast = {
                    let log = log.clone();
                    crate::spawn(async move {
                        sleep(Duration::from_millis(5)).await.ok();
                        log.borrow_mut().push("fast");
                    })
                };
                let _ = slow.await;
                let _ = fast.await;
            })
            .unwrap();

        assert_eq!(*order.borrow(), vec!["fast", "slow"]);
        event_loop.close().unwrap();
    }

    #[test]
    fn close_cancels_unfinished_tasks() {
        let event_loop = EventLoop::new();
        let pending = event_loop.create_task(async {
            sleep(Duration::from_secs(3600)).await.ok();
        });

        event_loop.run_until_complete(async {}).unwrap();
        assert_eq!(event_loop.all_tasks().len(), 1);

        event_loop.close().unwrap();
        assert!(pending.task().is_cancelled());
        assert!(event_loop.all_tasks().is_empty());
    }

    #[test]
    fn panicking_handler_falls_back_to_default() {
        let event_loop = EventLoop::new();
        let calls = Rc::new(Cell::new(0));

        let seen = calls.clone();
        event_loop.set_exception_handler(move |_, _| {
            seen.set(seen.get() + 1);
            panic!("handler failure");
        });
        event_loop.call_exception_handler(&ExceptionRecord::new("boom"));

        assert_eq!(calls.get(), 1);
        event_loop.close().unwrap();
    }
}
