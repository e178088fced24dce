use crate::error::Cancelled;
use crate::runtime::current;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that yields execution back to the event loop exactly once.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = Result<(), Cancelled>;

    /// Polls the yield future.
    ///
    /// On the first poll, the task yields by scheduling itself to be
    /// polled again and returning `Poll::Pending`.
    /// On the second poll, the future completes, unless the task was
    /// cancelled in between.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if current::take_cancellation() {
            return Poll::Ready(Err(Cancelled));
        }

        if !self.0 {
            self.0 = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        Poll::Ready(Ok(()))
    }
}

/// Yields execution back to the event loop.
///
/// This allows other tasks to make progress before the current task
/// continues. The function yields exactly once, and is a cancellation
/// point.
///
/// # Examples
///
/// ```rust,ignore
/// async fn task() -> Result<(), Cancelled> {
///     // Allow other tasks to run
///     yield_now().await?;
///     Ok(())
/// }
/// ```
pub async fn yield_now() -> Result<(), Cancelled> {
    YieldOnce(false).await
}
