use crate::error::Fault;
use crate::runtime::task::Task;

use tracing::error;

/// A failure reported to the loop's exception handler.
///
/// Records are produced for failures nobody is awaiting: background tasks
/// still failing during shutdown, panics that were never retrieved, and
/// asynchronous generators that could not be closed.
#[derive(Debug, Clone)]
pub struct ExceptionRecord {
    /// Human-readable description of what went wrong.
    pub message: String,

    /// The task that failed, if the failure belongs to one.
    pub task: Option<Task>,

    pub exception: Option<Fault>,

    /// Description of the generator that failed to close.
    pub asyncgen: Option<String>,
}

impl ExceptionRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            task: None,
            exception: None,
            asyncgen: None,
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_exception(mut self, exception: Fault) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_asyncgen(mut self, asyncgen: impl Into<String>) -> Self {
        self.asyncgen = Some(asyncgen.into());
        self
    }

    /// Logs the record at error level.
    pub(crate) fn log(record: &ExceptionRecord) {
        error!(
            task = record.task.as_ref().map(|t| t.id().as_u64()),
            exception = record.exception.as_ref().map(tracing::field::display),
            asyncgen = record.asyncgen.as_deref(),
            "{}",
            record.message
        );
    }
}
