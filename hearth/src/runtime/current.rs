use crate::runtime::EventLoop;
use crate::runtime::task::Task;

use std::cell::RefCell;

thread_local! {
    /// The event loop being driven on this thread, if any.
    ///
    /// Set for the whole duration of a drive, which is what lets
    /// [`spawn`](crate::spawn), timers and generators find their loop
    /// without explicit parameter passing, and what makes a nested drive
    /// on the same thread detectable.
    static CURRENT_LOOP: RefCell<Option<EventLoop>> = const { RefCell::new(None) };

    /// The task whose future is being polled right now.
    static CURRENT_TASK: RefCell<Option<Task>> = const { RefCell::new(None) };
}

/// Restores the previously driven loop when dropped.
pub(crate) struct LoopGuard {
    prev: Option<EventLoop>,
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_LOOP.with(|current| *current.borrow_mut() = prev);
    }
}

/// Restores the previously polled task when dropped.
pub(crate) struct TaskGuard {
    prev: Option<Task>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_TASK.with(|current| *current.borrow_mut() = prev);
    }
}

/// Marks `event_loop` as driven by the current thread.
pub(crate) fn enter_loop(event_loop: &EventLoop) -> LoopGuard {
    let prev = CURRENT_LOOP.with(|current| current.replace(Some(event_loop.clone())));
    LoopGuard { prev }
}

/// Marks `task` as the one being polled on the current thread.
pub(crate) fn enter_task(task: Task) -> TaskGuard {
    let prev = CURRENT_TASK.with(|current| current.replace(Some(task)));
    TaskGuard { prev }
}

/// Returns `true` if a loop is being driven on the current thread.
pub(crate) fn driving() -> bool {
    CURRENT_LOOP.with(|current| current.borrow().is_some())
}

pub(crate) fn running_loop() -> Option<EventLoop> {
    CURRENT_LOOP.with(|current| current.borrow().clone())
}

pub(crate) fn current_task() -> Option<Task> {
    CURRENT_TASK.with(|current| current.borrow().clone())
}

/// Consumes the pending cancellation of the current task, if any.
///
/// Cancellation points call this; the first one reached after
/// [`Task::cancel`] observes `true`, later ones `false` until the task is
/// cancelled again.
pub(crate) fn take_cancellation() -> bool {
    CURRENT_TASK.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(|task| task.take_cancellation())
    })
}
