//! Core runtime components.
//!
//! This module contains the building blocks of the event loop: task
//! storage and scheduling, timers, the ready queue wakers feed, and the
//! thread-local state that lets tasks find the loop driving them.
//!
//! Most users will interact with higher-level APIs built on top of
//! these components, such as [`Runner`](crate::Runner) and
//! [`run`](crate::run), rather than using this module directly.

mod core;
mod exception;
mod queue;

pub(crate) mod current;
pub(crate) mod timer;
pub(crate) mod yield_now;

pub mod task;

pub use self::core::EventLoop;
pub(crate) use self::core::LoopInner;
pub use exception::ExceptionRecord;

use crate::error::Error;

/// Returns the event loop being driven on the current thread.
///
/// # Errors
///
/// Returns [`Error::NoRunningLoop`] outside of a running loop.
pub fn running_loop() -> Result<EventLoop, Error> {
    current::running_loop().ok_or(Error::NoRunningLoop)
}
