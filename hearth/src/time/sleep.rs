use crate::error::Cancelled;
use crate::runtime::current;
use crate::runtime::timer::TimerShared;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Creates a future that completes after the given duration.
///
/// The returned sleep future registers a timer with the running event
/// loop and completes once the duration has elapsed. It is a
/// cancellation point: a cancelled task stops sleeping with
/// [`Cancelled`].
///
/// # Panics
///
/// Panics if polled outside of a running event loop.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(10)).await?;
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(duration)
}

/// A future that completes once a specific deadline is reached.
///
/// `Sleep` registers a timer with the running loop on first poll. The
/// timer is cancelled if the future is dropped before completion, so an
/// abandoned sleep never wakes its task.
pub struct Sleep {
    /// Absolute point in time when the sleep completes.
    deadline: Instant,

    /// Timer state shared with the loop, once registered.
    timer: Option<Rc<TimerShared>>,
}

impl Sleep {
    /// Creates a new `Sleep` future that completes after `duration`.
    ///
    /// The timer is not registered until the future is first polled.
    pub(crate) fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            timer: None,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = Result<(), Cancelled>;

    /// Polls the sleep future.
    ///
    /// On the first poll, the timer is registered with the loop. Later
    /// polls refresh the waker, since the task resuming the sleep may not
    /// be the one that started it.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if current::take_cancellation() {
            this.cancel_timer();
            return Poll::Ready(Err(Cancelled));
        }

        if Instant::now() >= this.deadline {
            this.cancel_timer();
            return Poll::Ready(Ok(()));
        }

        match &this.timer {
            Some(timer) => timer.update(cx.waker()),
            None => {
                let event_loop = current::running_loop()
                    .expect("Sleep polled outside of a running event loop");

                let timer = Rc::new(TimerShared::new(cx.waker().clone()));
                event_loop.register_timer(this.deadline, timer.clone());
                this.timer = Some(timer);
            }
        }

        Poll::Pending
    }
}

impl Sleep {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

impl Drop for Sleep {
    /// Cancels the timer if the sleep future is dropped before completion.
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
