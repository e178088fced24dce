//! Error types.
//!
//! [`Error`] covers everything the lifecycle surface can refuse to do.
//! Failures of the work itself are not folded in here: a root task's
//! output is handed back verbatim and its panics are re-raised, while
//! failures of background tasks and generators are reported as a
//! [`Fault`] through the loop's exception handler.

use thiserror::Error;

/// Errors returned by [`Runner`](crate::Runner), [`run`](crate::run) and
/// [`EventLoop`](crate::EventLoop).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The unit of work handed to `run` was already scheduled.
    #[error("a coroutine was expected, got {0}")]
    InvalidWorkUnit(&'static str),

    /// The runner has been closed and cannot be used again.
    #[error("Runner is closed")]
    Closed,

    /// A blocking entry point was invoked while a loop is being driven on
    /// the current thread.
    #[error("{entry} cannot be called from a running event loop")]
    Reentrancy { entry: &'static str },

    /// The event loop has been closed.
    #[error("event loop is closed")]
    LoopClosed,

    /// The event loop is running and cannot be closed.
    #[error("cannot close a running event loop")]
    LoopRunning,

    /// There is no event loop running on the current thread.
    #[error("no running event loop")]
    NoRunningLoop,

    /// The root task settled as cancelled.
    #[error("the top-level work was cancelled")]
    Cancelled,
}

/// Signal returned by cancellation points once the current task has been
/// asked to stop.
///
/// Propagate it with `?` to let the task settle as cancelled, or handle
/// it to run cleanup first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task was cancelled")]
pub struct Cancelled;

/// Why awaiting a [`JoinHandle`](crate::task::JoinHandle) produced no value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("task was cancelled")]
    Cancelled,

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// A failure delivered to the loop's exception handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// A task or generator body panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// A generator yielded again after being asked to close.
    #[error("asynchronous generator ignored its close request")]
    IgnoredClose,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_entry_point() {
        let err = Error::Reentrancy {
            entry: "Runner::run()",
        };
        assert_eq!(
            err.to_string(),
            "Runner::run() cannot be called from a running event loop"
        );
        assert_eq!(Error::Closed.to_string(), "Runner is closed");
        assert!(
            Error::InvalidWorkUnit("a scheduled task")
                .to_string()
                .starts_with("a coroutine was expected")
        );
    }
}
