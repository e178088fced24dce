use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskState {
    /// The task has not settled yet.
    ///
    /// It may be queued, idle, or currently being polled.
    Pending,

    /// The future returned `Poll::Ready` without a cancellation request.
    Completed,

    /// The task was cancelled, either before its first poll or by
    /// finishing after a cancellation request.
    Cancelled,

    /// A poll of the future panicked.
    Panicked,
}

impl TaskState {
    pub(crate) fn is_done(self) -> bool {
        self != TaskState::Pending
    }
}

/// Unique identifier of a task, stable for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}
