use crate::error::Error;
use crate::runtime::task::{JoinHandle, Task};

use std::future::Future;
use std::pin::Pin;

/// Boxed root future of a run.
pub type RootFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// A unit of work a [`Runner`](crate::Runner) can run.
///
/// Every future that has not been scheduled yet is a unit of work. Values
/// and closures are not futures and are rejected by the compiler. Handles
/// of work that is already scheduled ([`JoinHandle`] and [`Task`]) are
/// accepted by the type system but refused at run time with
/// [`Error::InvalidWorkUnit`]: a run always starts its work from scratch.
pub trait WorkUnit {
    type Output: 'static;

    /// Turns the work into the root future of a run.
    fn into_root(self) -> Result<RootFuture<Self::Output>, Error>;
}

impl<F> WorkUnit for F
where
    F: Future + 'static,
    F::Output: 'static,
{
    type Output = F::Output;

    fn into_root(self) -> Result<RootFuture<F::Output>, Error> {
        Ok(Box::pin(self))
    }
}

impl<T: 'static> WorkUnit for JoinHandle<T> {
    type Output = T;

    fn into_root(self) -> Result<RootFuture<T>, Error> {
        Err(Error::InvalidWorkUnit("a scheduled task"))
    }
}

impl WorkUnit for Task {
    type Output = ();

    fn into_root(self) -> Result<RootFuture<()>, Error> {
        Err(Error::InvalidWorkUnit("a scheduled task"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::EventLoop;

    #[test]
    fn futures_are_accepted() {
        assert!(async { 1 }.into_root().is_ok());
    }

    #[test]
    fn scheduled_tasks_are_refused() {
        let event_loop = EventLoop::new();
        let handle = event_loop.create_task(async { 1 });
        let task = handle.task().clone();

        assert_eq!(
            handle.into_root().err(),
            Some(Error::InvalidWorkUnit("a scheduled task"))
        );
        assert!(task.into_root().is_err());
        event_loop.close().unwrap();
    }
}
