use super::core::TaskCore;
use super::state::{TaskId, TaskState};
use crate::error::{Fault, JoinError};

use std::cell::RefCell;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// A type-erased handle to a scheduled task.
///
/// `Task` exposes the lifecycle of a task without its output: whether it
/// settled, how, and the cancellation request. Cloning a `Task` clones the
/// handle, not the task.
#[derive(Clone)]
pub struct Task {
    core: Rc<TaskCore>,
}

impl Task {
    pub(crate) fn from_core(core: Rc<TaskCore>) -> Self {
        Self { core }
    }

    pub(crate) fn core(&self) -> &Rc<TaskCore> {
        &self.core
    }

    pub fn id(&self) -> TaskId {
        self.core.id
    }

    /// Returns `true` once the task has settled, whatever the outcome.
    pub fn is_done(&self) -> bool {
        self.core.is_done()
    }

    /// Returns `true` if the task settled as cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.core.state() == TaskState::Cancelled
    }

    /// Returns `true` if cancellation was requested, even if the task has
    /// not observed it yet.
    pub fn is_cancel_requested(&self) -> bool {
        self.core.is_cancel_requested()
    }

    /// Requests cancellation of the task.
    ///
    /// The next cancellation point the task reaches (a
    /// [`sleep`](crate::time::sleep), [`yield_now`](crate::yield_now) or
    /// [`checkpoint`](crate::checkpoint)) returns
    /// [`Cancelled`](crate::Cancelled). A task suspended on any other
    /// future when it is woken is dropped at that point and settles as
    /// cancelled. A task that has not been polled yet never starts.
    /// Returns `false` if the task has already settled.
    pub fn cancel(&self) -> bool {
        self.core.cancel()
    }

    /// Returns the failure of a task that panicked.
    ///
    /// Calling this marks the failure as retrieved, so it is no longer
    /// reported when the task is dropped.
    pub fn fault(&self) -> Option<Fault> {
        self.core.fault()
    }

    pub(crate) fn take_cancellation(&self) -> bool {
        self.core.take_cancellation()
    }

    pub(crate) fn add_waiter(&self, waker: &Waker) {
        self.core.add_waiter(waker);
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.core.id)
            .field("state", &self.core.state())
            .finish()
    }
}

/// A handle to a spawned task and its output.
///
/// `JoinHandle` is not itself a future: `.await` it (through
/// [`IntoFuture`]) to wait for the task to settle.
///
/// Dropping the `JoinHandle` does **not** cancel the task; it only
/// discards the ability to observe its result.
pub struct JoinHandle<T> {
    task: Task,

    /// Written by the task once its future returns.
    pub(crate) slot: Rc<RefCell<Option<T>>>,
}

impl<T> JoinHandle<T> {
    pub(crate) fn new(task: Task, slot: Rc<RefCell<Option<T>>>) -> Self {
        Self { task, slot }
    }

    /// The type-erased handle of the underlying task.
    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn id(&self) -> TaskId {
        self.task.id()
    }

    pub fn is_done(&self) -> bool {
        self.task.is_done()
    }

    /// See [`Task::cancel`].
    pub fn cancel(&self) -> bool {
        self.task.cancel()
    }

    /// Takes the output of a settled task, if any.
    pub(crate) fn into_outcome(self) -> Outcome<T> {
        let core = self.task.core();
        match core.state() {
            TaskState::Pending => Outcome::Pending,
            TaskState::Cancelled => Outcome::Cancelled,
            TaskState::Panicked => match core.take_panic() {
                Some(payload) => Outcome::Panicked(payload),
                None => Outcome::Cancelled,
            },
            TaskState::Completed => match self.slot.borrow_mut().take() {
                Some(value) => Outcome::Completed(value),
                None => Outcome::Cancelled,
            },
        }
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("task", &self.task)
            .finish()
    }
}

/// How a task settled, with its output or panic payload.
pub(crate) enum Outcome<T> {
    Pending,
    Completed(T),
    Cancelled,
    Panicked(super::core::PanicPayload),
}

impl<T> IntoFuture for JoinHandle<T> {
    type Output = Result<T, JoinError>;
    type IntoFuture = Join<T>;

    fn into_future(self) -> Join<T> {
        Join { handle: self }
    }
}

/// Future returned by awaiting a [`JoinHandle`].
pub struct Join<T> {
    handle: JoinHandle<T>,
}

impl<T> Future for Join<T> {
    type Output = Result<T, JoinError>;

    /// Polls the join future.
    ///
    /// If the task has already settled, its outcome is returned
    /// immediately. Otherwise, the current waker is registered and
    /// the future returns `Poll::Pending`.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let task = &self.handle.task;

        match task.core().state() {
            TaskState::Pending => {
                task.add_waiter(cx.waker());
                Poll::Pending
            }
            TaskState::Completed => match self.handle.slot.borrow_mut().take() {
                Some(value) => Poll::Ready(Ok(value)),
                None => Poll::Ready(Err(JoinError::Cancelled)),
            },
            TaskState::Cancelled => Poll::Ready(Err(JoinError::Cancelled)),
            TaskState::Panicked => {
                let message = match task.fault() {
                    Some(Fault::Panicked(message)) => message,
                    _ => String::new(),
                };
                Poll::Ready(Err(JoinError::Panicked(message)))
            }
        }
    }
}
