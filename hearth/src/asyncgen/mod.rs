//! Asynchronous generators.
//!
//! An [`AsyncGenerator`] produces a sequence of values from an async body,
//! one [`next`](AsyncGenerator::next) at a time. The first iteration
//! registers it with the running event loop, which closes every
//! generator left open when the loop is shut down by a
//! [`Runner`](crate::Runner).
//!
//! A generator dropped while suspended is closed by a task scheduled on
//! its loop, so that its cleanup code still runs.

mod yielder;

pub use yielder::{YieldPoint, Yielder};

use crate::error::{Cancelled, Fault};
use crate::runtime::current;
use crate::runtime::{EventLoop, ExceptionRecord, LoopInner};
use yielder::Slot;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::{Future, poll_fn};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use tracing::{trace, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type Frame = Pin<Box<dyn Future<Output = Result<(), Cancelled>>>>;

/// Lifecycle hooks the event loop needs from a registered generator.
pub(crate) trait Finalize {
    /// Returns `true` once the body has finished or been released.
    fn is_finalized(&self) -> bool;

    fn describe(&self) -> String;

    fn aclose_boxed(self: Rc<Self>) -> Pin<Box<dyn Future<Output = Result<(), Fault>>>>;
}

struct GenCore<T> {
    id: u64,

    /// The suspended body; `None` while polled and once finished.
    frame: RefCell<Option<Frame>>,

    slot: Rc<Slot<T>>,

    running: Cell<bool>,

    /// Whether iteration has begun.
    started: Cell<bool>,

    /// Loop the generator was first iterated on.
    owner: RefCell<Weak<LoopInner>>,
}

/// An asynchronous generator.
///
/// Cloning a generator clones the handle; all clones iterate the same
/// sequence.
pub struct AsyncGenerator<T: 'static> {
    core: Rc<GenCore<T>>,
}

impl<T: 'static> AsyncGenerator<T> {
    /// Creates a generator from its body.
    ///
    /// The body receives the [`Yielder`] it yields values through. It runs
    /// lazily: nothing happens until the first [`next`](Self::next).
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: FnOnce(Yielder<T>) -> Fut,
        Fut: Future<Output = Result<(), Cancelled>> + 'static,
    {
        let slot = Rc::new(Slot::new());
        let frame: Frame = Box::pin(body(Yielder::new(slot.clone())));

        Self {
            core: Rc::new(GenCore {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                frame: RefCell::new(Some(frame)),
                slot,
                running: Cell::new(false),
                started: Cell::new(false),
                owner: RefCell::new(Weak::new()),
            }),
        }
    }

    /// Resumes the body until it yields the next value.
    ///
    /// Resolves to `Ok(None)` once the body has returned, and to
    /// [`Cancelled`] if the body stopped because its task was cancelled.
    ///
    /// # Panics
    ///
    /// The returned future panics if the generator is already being
    /// resumed elsewhere.
    pub fn next(&self) -> Next<'_, T> {
        Next {
            generator: self,
            active: false,
        }
    }

    /// Closes the generator.
    ///
    /// A suspended body is resumed with [`Cancelled`] at the point where it
    /// yielded and run to completion. A body that yields again instead of
    /// returning is released and reported as [`Fault::IgnoredClose`].
    pub async fn aclose(&self) -> Result<(), Fault> {
        close(self.core.clone()).await
    }

    /// Returns `true` while the body is being resumed.
    pub fn is_running(&self) -> bool {
        self.core.running.get()
    }

    /// Returns `true` once the body has finished or been released.
    pub fn is_finalized(&self) -> bool {
        self.core.is_finalized()
    }
}

impl<T: 'static> Clone for AsyncGenerator<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: 'static> fmt::Debug for AsyncGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncGenerator")
            .field("id", &self.core.id)
            .field("running", &self.core.running.get())
            .field("finalized", &self.core.frame.borrow().is_none())
            .finish()
    }
}

impl<T: 'static> Drop for AsyncGenerator<T> {
    /// Schedules the closing of a generator dropped while suspended.
    ///
    /// Nothing is scheduled if another handle is alive, if iteration never
    /// started, or if the loop it ran on is gone or closed.
    fn drop(&mut self) {
        if Rc::strong_count(&self.core) != 1
            || !self.core.started.get()
            || self.core.frame.borrow().is_none()
        {
            return;
        }

        let Some(event_loop) = self.core.owner.borrow().upgrade().map(EventLoop::from_inner)
        else {
            return;
        };
        if event_loop.is_closed() {
            return;
        }

        let core = self.core.clone();
        let name = format!("AsyncGenerator#{}", core.id);
        let reporter = event_loop.clone();

        trace!(asyncgen = %name, "scheduling close of dropped generator");
        let scheduled = event_loop.try_create_task_in(
            async move {
                if let Err(fault) = close(core).await {
                    let record = ExceptionRecord::new(format!(
                        "an error occurred during closing of asynchronous generator {name}"
                    ))
                    .with_exception(fault)
                    .with_asyncgen(name);
                    reporter.call_exception_handler(&record);
                }
            },
            crate::context::Context::new(),
        );

        if let Err(err) = scheduled {
            warn!(%err, "failed to schedule the close of a dropped asynchronous generator");
        }
    }
}

impl<T: 'static> GenCore<T> {
    /// Registers the generator with the running loop on first iteration.
    fn start(self: &Rc<Self>) {
        if self.started.replace(true) {
            return;
        }

        if let Some(event_loop) = current::running_loop() {
            *self.owner.borrow_mut() = event_loop.downgrade();
            let weak: Weak<dyn Finalize> = Rc::downgrade(self) as Weak<dyn Finalize>;
            event_loop.register_asyncgen(weak);
        }
    }
}

impl<T: 'static> Finalize for GenCore<T> {
    fn is_finalized(&self) -> bool {
        self.frame.borrow().is_none()
    }

    fn describe(&self) -> String {
        format!("AsyncGenerator#{}", self.id)
    }

    fn aclose_boxed(self: Rc<Self>) -> Pin<Box<dyn Future<Output = Result<(), Fault>>>> {
        Box::pin(close(self))
    }
}

/// Resets the running flag when dropped, including on unwind.
struct Running<'a>(&'a Cell<bool>);

impl<'a> Running<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        if flag.replace(true) {
            panic!("asynchronous generator is already running");
        }
        Self(flag)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

async fn close<T: 'static>(core: Rc<GenCore<T>>) -> Result<(), Fault> {
    if !core.started.replace(true) {
        let frame = core.frame.borrow_mut().take();
        drop(frame);
        return Ok(());
    }

    core.slot.request_close();

    poll_fn(|cx| {
        let Some(mut frame) = core.frame.borrow_mut().take() else {
            return Poll::Ready(Ok(()));
        };

        let polled = {
            let _running = Running::enter(&core.running);
            frame.as_mut().poll(cx)
        };

        match polled {
            Poll::Ready(_) => Poll::Ready(Ok(())),
            Poll::Pending if core.slot.value.borrow_mut().take().is_some() => {
                Poll::Ready(Err(Fault::IgnoredClose))
            }
            Poll::Pending => {
                *core.frame.borrow_mut() = Some(frame);
                Poll::Pending
            }
        }
    })
    .await
}

/// Future returned by [`AsyncGenerator::next`].
pub struct Next<'a, T: 'static> {
    generator: &'a AsyncGenerator<T>,

    /// Whether this future holds the generator's running flag.
    active: bool,
}

impl<T: 'static> Future for Next<'_, T> {
    type Output = Result<Option<T>, Cancelled>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let core = self.generator.core.clone();

        if !self.active {
            if core.running.replace(true) {
                panic!("asynchronous generator is already running");
            }
            self.active = true;
            core.start();
        }

        let Some(mut frame) = core.frame.borrow_mut().take() else {
            self.finish();
            return Poll::Ready(Ok(None));
        };

        // A panicking body unwinds through here and drops the frame.
        match frame.as_mut().poll(cx) {
            Poll::Ready(result) => {
                drop(frame);
                let leftover = core.slot.value.borrow_mut().take();
                drop(leftover);
                self.finish();
                Poll::Ready(result.map(|()| None))
            }
            Poll::Pending => {
                *core.frame.borrow_mut() = Some(frame);
                let value = core.slot.value.borrow_mut().take();
                match value {
                    Some(value) => {
                        self.finish();
                        Poll::Ready(Ok(Some(value)))
                    }
                    None => Poll::Pending,
                }
            }
        }
    }
}

impl<T: 'static> Next<'_, T> {
    fn finish(&mut self) {
        if self.active {
            self.active = false;
            self.generator.core.running.set(false);
        }
    }
}

impl<T: 'static> Drop for Next<'_, T> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::sleep;
    use std::time::Duration;

    fn counter(limit: u32, cleaned: Rc<Cell<bool>>) -> AsyncGenerator<u32> {
        AsyncGenerator::new(move |co| async move {
            let result = async {
                for n in 0..limit {
                    co.yield_(n).await?;
                }
                Ok::<(), Cancelled>(())
            }
            .await;
            cleaned.set(true);
            result
        })
    }

    #[test]
    fn yields_values_then_finishes() {
        let event_loop = EventLoop::new();
        let cleaned = Rc::new(Cell::new(false));
        let generator = counter(3, cleaned.clone());

        let values = event_loop
            .run_until_complete({
                let generator = generator.clone();
                async move {
                    let mut values = Vec::new();
                    while let Ok(Some(n)) = generator.next().await {
                        values.push(n);
                    }
                    values
                }
            })
            .unwrap();

        assert_eq!(values, vec![0, 1, 2]);
        assert!(cleaned.get());
        assert!(generator.is_finalized());
        assert!(!generator.is_running());
        event_loop.close().unwrap();
    }

    #[test]
    fn aclose_runs_cleanup_of_a_suspended_body() {
        let event_loop = EventLoop::new();
        let cleaned = Rc::new(Cell::new(false));
        let generator = counter(10, cleaned.clone());

        let closed = event_loop
            .run_until_complete({
                let generator = generator.clone();
                async move {
                    assert_eq!(generator.next().await, Ok(Some(0)));
                    generator.aclose().await
                }
            })
            .unwrap();

        assert_eq!(closed, Ok(()));
        assert!(cleaned.get());
        assert!(generator.is_finalized());
        event_loop.close().unwrap();
    }

    #[test]
    fn yielding_after_close_is_a_fault() {
        let event_loop = EventLoop::new();
        let stubborn = AsyncGenerator::new(|co| async move {
            for _ in 0..100 {
                let _ = co.yield_(1).await;
            }
            Ok::<(), Cancelled>(())
        });

        let closed = event_loop
            .run_until_complete({
                let stubborn = stubborn.clone();
                async move {
                    let _ = stubborn.next().await;
                    stubborn.aclose().await
                }
            })
            .unwrap();

        assert_eq!(closed, Err(Fault::IgnoredClose));
        assert!(stubborn.is_finalized());
        event_loop.close().unwrap();
    }

    #[test]
    fn shutdown_closes_registered_generators() {
        let event_loop = EventLoop::new();
        let cleaned = Rc::new(Cell::new(false));
        let generator = counter(10, cleaned.clone());

        event_loop
            .run_until_complete({
                let generator = generator.clone();
                async move {
                    let _ = generator.next().await;
                }
            })
            .unwrap();
        assert!(!cleaned.get());

        event_loop
            .run_until_complete(event_loop.shutdown_async_generators())
            .unwrap();

        assert!(cleaned.get());
        assert!(generator.is_finalized());
        event_loop.close().unwrap();
    }

    #[test]
    fn dropped_generator_is_closed_on_its_loop() {
        let event_loop = EventLoop::new();
        let cleaned = Rc::new(Cell::new(false));

        event_loop
            .run_until_complete({
                let cleaned = cleaned.clone();
                async move {
                    let generator = counter(10, cleaned);
                    let _ = generator.next().await;
                    drop(generator);
                    crate::yield_now().await.ok();
                    crate::yield_now().await.ok();
                }
            })
            .unwrap();

        assert!(cleaned.get());
        event_loop.close().unwrap();
    }

    #[test]
    fn cancellation_inside_the_body_finishes_it() {
        let event_loop = EventLoop::new();
        let ticker = AsyncGenerator::new(|co| async move {
            for _ in 0..u32::MAX {
                co.yield_(()).await?;
                sleep(Duration::from_secs(3600)).await?;
            }
            Ok::<(), Cancelled>(())
        });

        let outcome = event_loop
            .run_until_complete({
                let ticker = ticker.clone();
                async move {
                    let consumer = crate::spawn(async move {
                        while let Some(()) = ticker.next().await? {}
                        Ok::<_, Cancelled>(())
                    });
                    crate::yield_now().await.ok();
                    consumer.cancel();
                    consumer.await
                }
            })
            .unwrap();

        assert_eq!(outcome, Err(crate::JoinError::Cancelled));
        assert!(ticker.is_finalized());
        assert!(!ticker.is_running());
        event_loop.close().unwrap();
    }
}
