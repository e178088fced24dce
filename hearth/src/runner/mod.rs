//! Lifecycle management of event loops.
//!
//! A [`Runner`] owns one [`EventLoop`](crate::EventLoop): it creates it on
//! first use, drives one unit of top-level work at a time on it, and tears
//! it down deterministically. Tearing down cancels and awaits the tasks
//! the work left behind, then closes the asynchronous generators still
//! suspended, and only then closes the loop.
//!
//! [`run`] is the one-shot form: a throwaway runner for a single unit of
//! work, closed on every exit path.

mod builder;
mod core;
mod shutdown;
mod work;

pub use self::core::{Runner, RunnerScope};
pub use builder::RunnerBuilder;
pub use work::{RootFuture, WorkUnit};

use crate::error::Error;
use crate::runtime::current;

use std::panic::{self, AssertUnwindSafe};

/// Runs `work` on a fresh event loop and closes it.
///
/// This is [`run_with`] without a debug override.
///
/// # Examples
///
/// ```rust,ignore
/// let answer = hearth::run(async {
///     hearth::time::sleep(Duration::from_millis(10)).await?;
///     Ok::<_, hearth::Cancelled>(42)
/// })?;
/// ```
pub fn run<W: WorkUnit>(work: W) -> Result<W::Output, Error> {
    run_with(work, None)
}

/// Runs `work` on a fresh event loop and closes it, optionally forcing
/// debug mode on or off.
///
/// The loop is shut down and closed whatever the outcome of the work. A
/// panic of the work is re-raised once that is done.
///
/// # Errors
///
/// - [`Error::Reentrancy`] if a loop is being driven on this thread,
/// - the errors of [`Runner::run`],
/// - the error of [`Runner::close`], if the work itself succeeded.
pub fn run_with<W: WorkUnit>(work: W, debug: Option<bool>) -> Result<W::Output, Error> {
    if current::driving() {
        return Err(Error::Reentrancy {
            entry: "hearth::run()",
        });
    }

    let mut builder = Runner::builder().entry_point("hearth::run()");
    if let Some(enabled) = debug {
        builder = builder.debug(enabled);
    }

    let runner = builder.build();
    let scope = runner.enter()?;

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| scope.run(work)));
    let closed = scope.exit();

    match outcome {
        Ok(result) => {
            let value = result?;
            closed?;
            Ok(value)
        }
        Err(payload) => panic::resume_unwind(payload),
    }
}
