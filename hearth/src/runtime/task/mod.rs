//! Asynchronous task primitives.
//!
//! This module defines the abstractions used by the event loop to
//! represent, schedule, and settle tasks.
//!
//! It includes:
//! - task state management and identifiers,
//! - waker integration with the loop's ready queue,
//! - handles for observing, awaiting and cancelling tasks,
//! - [`gather`] for waiting on a group of tasks.
//!
//! Most users will interact with this module through [`spawn`] and the
//! returned [`JoinHandle`], while the lower-level components are used
//! internally by the event loop.

pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod set;
pub(crate) mod state;
pub(crate) mod waker;

pub use handle::{Join, JoinHandle, Task};
pub use set::{Gather, gather};
pub use state::TaskId;

use crate::error::Cancelled;
use crate::runtime::current;

use std::future::Future;

/// Spawns a new task on the running event loop.
///
/// The task starts with a copy of the spawner's current context and is
/// polled once the spawner yields back to the loop.
///
/// # Panics
///
/// Panics if called outside of a running event loop.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = hearth::spawn(async { 40 + 2 });
/// assert_eq!(handle.await, Ok(42));
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let event_loop = current::running_loop()
        .expect("spawn must be called within the context of a running event loop");

    event_loop.create_task(future)
}

/// Returns the task being polled on this thread, if any.
pub fn current() -> Option<Task> {
    current::current_task()
}

/// Checks whether the current task has been asked to stop.
///
/// This is the synchronous cancellation point: long computations that
/// never await can call it between steps and propagate the error with
/// `?`. Outside of a task it always succeeds.
pub fn checkpoint() -> Result<(), Cancelled> {
    if current::take_cancellation() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}
