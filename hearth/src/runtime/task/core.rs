use super::state::{TaskId, TaskState};
use crate::context::Context;
use crate::error::Fault;
use crate::runtime::current;
use crate::runtime::exception::ExceptionRecord;
use crate::runtime::task::Task;
use crate::runtime::{EventLoop, LoopInner};
use crate::utils::panic_message;

use std::any::Any;
use std::cell::{Cell, OnceCell, RefCell};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context as TaskContext, Poll, Waker};
use std::time::Instant;

use tracing::trace;

/// Type-erased future driven by a task.
///
/// The typed output is written into the owning
/// [`JoinHandle`](super::JoinHandle)'s slot by a wrapper future, so the loop
/// only ever sees `()`.
pub(crate) type TaskFuture = Pin<Box<dyn Future<Output = ()>>>;

pub(crate) type PanicPayload = Box<dyn Any + Send>;

/// A task scheduled on an event loop.
///
/// `TaskCore` is the container for a future. It coordinates the lifecycle
/// of that future: its state, its waker, the cancellation handshake and
/// the storage of a panic payload.
pub(crate) struct TaskCore {
    pub(crate) id: TaskId,

    /// The underlying future; `None` while it is being polled and after
    /// the task has settled.
    future: RefCell<Option<TaskFuture>>,

    state: Cell<TaskState>,

    /// Context installed as current while the future is polled.
    context: Context,

    /// Whether the future has been polled at least once.
    polled: Cell<bool>,

    /// Set by [`cancel`](Self::cancel) and never cleared: decides how the
    /// task settles.
    cancel_requested: Cell<bool>,

    /// Armed by [`cancel`](Self::cancel), consumed by the first
    /// cancellation point the task reaches.
    cancel_pending: Cell<bool>,

    /// Panic payload and its message, once the task panicked.
    panic: RefCell<Option<PanicPayload>>,
    panic_message: RefCell<Option<String>>,

    /// Whether the panic was observed through a handle.
    fault_retrieved: Cell<bool>,

    /// Wakers of futures waiting for this task to settle.
    waiters: RefCell<Vec<Waker>>,

    /// Shared with this task's waker; set while queued.
    pub(crate) queued: Arc<AtomicBool>,

    /// The task's waker, bound once the task has a slab key.
    waker: OnceCell<Waker>,

    event_loop: Weak<LoopInner>,
}

impl TaskCore {
    pub(crate) fn new(future: TaskFuture, context: Context, event_loop: Weak<LoopInner>) -> Self {
        Self {
            id: TaskId::next(),
            future: RefCell::new(Some(future)),
            state: Cell::new(TaskState::Pending),
            context,
            polled: Cell::new(false),
            cancel_requested: Cell::new(false),
            cancel_pending: Cell::new(false),
            panic: RefCell::new(None),
            panic_message: RefCell::new(None),
            fault_retrieved: Cell::new(false),
            waiters: RefCell::new(Vec::new()),
            queued: Arc::new(AtomicBool::new(false)),
            waker: OnceCell::new(),
            event_loop,
        }
    }

    /// Installs the task's waker and schedules its first poll.
    pub(crate) fn bind(&self, waker: Waker) {
        waker.wake_by_ref();
        let _ = self.waker.set(waker);
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state.get()
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state.get().is_done()
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.get()
    }

    /// Polls the task once.
    ///
    /// The task's context and the task itself are installed as current for
    /// the duration of the poll, and panics are caught so that one failing
    /// task never takes the loop down. Returns `true` once the task has
    /// settled.
    pub(crate) fn run(self: &Rc<Self>, event_loop: &LoopInner) -> bool {
        if self.is_done() {
            return true;
        }

        self.queued.store(false, Ordering::Release);

        let Some(mut future) = self.future.borrow_mut().take() else {
            return false;
        };

        // Cancelled before it ever ran: the body never starts.
        if self.cancel_requested.get() && !self.polled.get() {
            drop(future);
            self.settle(TaskState::Cancelled);
            return true;
        }

        self.polled.set(true);

        let Some(waker) = self.waker.get().cloned() else {
            *self.future.borrow_mut() = Some(future);
            return false;
        };
        let mut cx = TaskContext::from_waker(&waker);

        // A cancellation armed before this poll and still armed after it
        // reached a suspension point that does not observe it.
        let delivering = self.cancel_pending.get();

        let started = Instant::now();
        let polled = {
            let _task = current::enter_task(Task::from_core(self.clone()));
            let _context = self.context.enter();

            panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
        };
        event_loop.observe_poll(self.id, started.elapsed());

        match polled {
            Ok(Poll::Pending) if delivering && self.cancel_pending.get() => {
                self.cancel_pending.set(false);
                {
                    let _context = self.context.enter();
                    drop(future);
                }
                self.settle(TaskState::Cancelled);
                true
            }
            Ok(Poll::Pending) => {
                *self.future.borrow_mut() = Some(future);
                false
            }
            Ok(Poll::Ready(())) => {
                drop(future);
                let state = if self.cancel_requested.get() {
                    TaskState::Cancelled
                } else {
                    TaskState::Completed
                };
                self.settle(state);
                true
            }
            Err(payload) => {
                drop(future);
                *self.panic_message.borrow_mut() = Some(panic_message(&*payload));
                *self.panic.borrow_mut() = Some(payload);
                self.settle(TaskState::Panicked);
                true
            }
        }
    }

    /// Requests cancellation.
    ///
    /// Returns `false` if the task has already settled. Otherwise the task
    /// is woken and its next cancellation point returns
    /// [`Cancelled`](crate::Cancelled). If the task suspends again without
    /// reaching one, its future is dropped and it settles as cancelled.
    pub(crate) fn cancel(&self) -> bool {
        if self.is_done() {
            return false;
        }

        self.cancel_requested.set(true);
        self.cancel_pending.set(true);

        if let Some(waker) = self.waker.get() {
            waker.wake_by_ref();
        }

        true
    }

    pub(crate) fn take_cancellation(&self) -> bool {
        self.cancel_pending.replace(false)
    }

    /// Settles a task that will never be polled again, e.g. because its
    /// loop is closing.
    pub(crate) fn abandon(&self) {
        if self.is_done() {
            return;
        }

        let future = self.future.borrow_mut().take();
        drop(future);
        self.cancel_requested.set(true);
        self.settle(TaskState::Cancelled);
    }

    /// Registers `waker` to be woken when the task settles.
    pub(crate) fn add_waiter(&self, waker: &Waker) {
        let mut waiters = self.waiters.borrow_mut();
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }

    /// Returns the panic message and marks it as observed.
    pub(crate) fn fault(&self) -> Option<Fault> {
        if self.state.get() != TaskState::Panicked {
            return None;
        }

        self.fault_retrieved.set(true);
        self.panic_message.borrow().clone().map(Fault::Panicked)
    }

    /// Takes the original panic payload, for re-raising it verbatim.
    pub(crate) fn take_panic(&self) -> Option<PanicPayload> {
        self.fault_retrieved.set(true);
        self.panic.borrow_mut().take()
    }

    fn settle(&self, state: TaskState) {
        self.state.set(state);
        trace!(task = %self.id, ?state, "task settled");

        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waker in waiters {
            waker.wake();
        }
    }
}

impl Drop for TaskCore {
    /// Reports a panic nobody looked at.
    ///
    /// Handles that awaited the task, or the shutdown pass that collected
    /// its failure, mark the panic as retrieved; anything else is surfaced
    /// here, once the last handle to the task is gone.
    fn drop(&mut self) {
        if self.state.get() != TaskState::Panicked || self.fault_retrieved.get() {
            return;
        }

        let message = self
            .panic_message
            .borrow_mut()
            .take()
            .unwrap_or_default();
        let record = ExceptionRecord::new(format!(
            "Task exception was never retrieved ({})",
            self.id
        ))
        .with_exception(Fault::Panicked(message));

        match self.event_loop.upgrade().map(EventLoop::from_inner) {
            Some(event_loop) if !event_loop.is_closed() => {
                event_loop.call_exception_handler(&record);
            }
            _ => ExceptionRecord::log(&record),
        }
    }
}
