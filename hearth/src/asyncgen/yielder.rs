use crate::error::Cancelled;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

/// Hand-off point between a generator body and whoever drives it.
pub(crate) struct Slot<T> {
    /// Value yielded by the body and not yet taken by the driver.
    pub(crate) value: RefCell<Option<T>>,

    /// Set once the generator has been asked to close.
    closing: Cell<bool>,

    /// Set once the close request has been delivered to the body.
    close_delivered: Cell<bool>,
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Self {
        Self {
            value: RefCell::new(None),
            closing: Cell::new(false),
            close_delivered: Cell::new(false),
        }
    }

    pub(crate) fn request_close(&self) {
        self.closing.set(true);
    }

    /// Delivers the close request, at most once.
    fn take_close(&self) -> bool {
        if self.closing.get() && !self.close_delivered.get() {
            self.close_delivered.set(true);
            true
        } else {
            false
        }
    }
}

/// Handle a generator body yields values through.
///
/// # Examples
///
/// ```rust,ignore
/// let numbers = AsyncGenerator::new(|co| async move {
///     for n in 0..3 {
///         co.yield_(n).await?;
///     }
///     Ok(())
/// });
/// ```
pub struct Yielder<T> {
    slot: Rc<Slot<T>>,
}

impl<T> Yielder<T> {
    pub(crate) fn new(slot: Rc<Slot<T>>) -> Self {
        Self { slot }
    }

    /// Hands `value` to the consumer and suspends until the next value is
    /// requested.
    ///
    /// Resolves to [`Cancelled`] when the generator is being closed
    /// instead; the body is expected to return promptly.
    pub fn yield_(&self, value: T) -> YieldPoint<T> {
        YieldPoint {
            slot: self.slot.clone(),
            value: Some(value),
            yielded: false,
        }
    }
}

/// Future returned by [`Yielder::yield_`].
pub struct YieldPoint<T> {
    slot: Rc<Slot<T>>,
    value: Option<T>,
    yielded: bool,
}

impl<T> Unpin for YieldPoint<T> {}

impl<T> Future for YieldPoint<T> {
    type Output = Result<(), Cancelled>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.slot.take_close() {
            return Poll::Ready(Err(Cancelled));
        }

        if self.yielded {
            return Poll::Ready(Ok(()));
        }

        // No waker is registered: the driver sees the value and resumes
        // the body on the next request.
        let value = self.value.take();
        *self.slot.value.borrow_mut() = value;
        self.yielded = true;

        Poll::Pending
    }
}
