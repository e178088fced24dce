use super::builder::{LoopFactory, RunnerBuilder};
use super::shutdown;
use super::work::{RootFuture, WorkUnit};
use crate::context::{Context, copy_context};
use crate::error::Error;
use crate::runtime::EventLoop;
use crate::runtime::current;
use crate::runtime::task::handle::Outcome;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::panic;

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunnerState {
    /// No loop has been created yet.
    Fresh,
    Active,
    Closed,
}

/// Owner of an event loop and of the context its runs share.
///
/// A `Runner` creates its loop lazily, runs top-level work on it one unit
/// at a time, and reconciles leftover tasks and generators when it is
/// closed. Every [`run`](Self::run) installs the same [`Context`], so
/// context variables set by one run are visible to the next.
///
/// # Examples
///
/// ```rust,ignore
/// let runner = Runner::new();
/// let scope = runner.enter()?;
///
/// assert_eq!(scope.run(async { 1 })?, 1);
/// assert_eq!(scope.run(async { 2 })?, 2);
/// ```
pub struct Runner {
    state: Cell<RunnerState>,

    debug: Option<bool>,

    /// Consumed when the loop is created.
    loop_factory: RefCell<Option<LoopFactory>>,

    event_loop: RefCell<Option<EventLoop>>,

    /// Context installed in every run; captured on first use unless
    /// configured.
    context: RefCell<Option<Context>>,

    /// Entry point named in shutdown reports.
    entry: &'static str,
}

impl Runner {
    /// Creates a runner with the default configuration.
    pub fn new() -> Self {
        RunnerBuilder::new().build()
    }

    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    pub(crate) fn from_parts(
        debug: Option<bool>,
        loop_factory: Option<LoopFactory>,
        context: Option<Context>,
        entry: &'static str,
    ) -> Self {
        Self {
            state: Cell::new(RunnerState::Fresh),
            debug,
            loop_factory: RefCell::new(loop_factory),
            event_loop: RefCell::new(None),
            context: RefCell::new(context),
            entry,
        }
    }

    /// Returns `true` once the runner has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.get() == RunnerState::Closed
    }

    /// Returns the runner's loop, creating it on first call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the runner is closed.
    pub fn get_loop(&self) -> Result<EventLoop, Error> {
        self.lazy_init()
    }

    /// Runs `work` to completion on the runner's loop and returns its
    /// output.
    ///
    /// The work runs as the root task, in the runner's context. Tasks it
    /// spawns keep running alongside it, and those still pending when it
    /// finishes are left to [`close`](Self::close). A panic of the work is
    /// re-raised on the calling thread.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidWorkUnit`] if `work` is already scheduled,
    /// - [`Error::Reentrancy`] if a loop is being driven on this thread,
    /// - [`Error::Closed`] if the runner is closed,
    /// - [`Error::Cancelled`] if the root task was cancelled.
    pub fn run<W: WorkUnit>(&self, work: W) -> Result<W::Output, Error> {
        let root = work.into_root()?;
        self.run_root(root, None)
    }

    /// Like [`run`](Self::run), but executes `work` in `context` instead of
    /// the runner's own context.
    pub fn run_with_context<W: WorkUnit>(
        &self,
        work: W,
        context: Context,
    ) -> Result<W::Output, Error> {
        let root = work.into_root()?;
        self.run_root(root, Some(context))
    }

    fn run_root<T: 'static>(
        &self,
        root: RootFuture<T>,
        context: Option<Context>,
    ) -> Result<T, Error> {
        if current::driving() {
            return Err(Error::Reentrancy {
                entry: "Runner::run()",
            });
        }

        let event_loop = self.lazy_init()?;
        let context = match context {
            Some(context) => context,
            None => self.context.borrow().clone().ok_or(Error::Closed)?,
        };

        let handle = event_loop.try_create_task_in(root, context)?;
        event_loop.run_until(handle.task())?;

        match handle.into_outcome() {
            Outcome::Completed(value) => Ok(value),
            Outcome::Panicked(payload) => panic::resume_unwind(payload),
            Outcome::Cancelled | Outcome::Pending => Err(Error::Cancelled),
        }
    }

    fn lazy_init(&self) -> Result<EventLoop, Error> {
        match self.state.get() {
            RunnerState::Closed => Err(Error::Closed),
            RunnerState::Active => self.event_loop.borrow().clone().ok_or(Error::Closed),
            RunnerState::Fresh => {
                let factory = self.loop_factory.borrow_mut().take();
                let event_loop = match factory {
                    Some(factory) => factory(),
                    None => EventLoop::new(),
                };

                if let Some(enabled) = self.debug {
                    event_loop.set_debug(enabled);
                }

                self.context
                    .borrow_mut()
                    .get_or_insert_with(copy_context);
                *self.event_loop.borrow_mut() = Some(event_loop.clone());
                self.state.set(RunnerState::Active);

                debug!(
                    entry = self.entry,
                    debug = event_loop.get_debug(),
                    "runner initialized"
                );
                Ok(event_loop)
            }
        }
    }

    /// Shuts down and closes the runner's loop.
    ///
    /// Pending tasks are cancelled and awaited, and live asynchronous
    /// generators are closed, before the loop is closed. Failures of those
    /// tasks and generators are reported to the loop's exception handler.
    /// Closing a runner that never created its loop, or one that is
    /// already closed, does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Reentrancy`] when called from work running on a
    /// loop; the runner stays usable. Any error driving the shutdown is
    /// returned after the loop has been closed anyway.
    pub fn close(&self) -> Result<(), Error> {
        match self.state.get() {
            RunnerState::Closed => return Ok(()),
            RunnerState::Fresh => {
                let factory = self.loop_factory.borrow_mut().take();
                drop(factory);
                self.state.set(RunnerState::Closed);
                return Ok(());
            }
            RunnerState::Active => {}
        }

        let Some(event_loop) = self.event_loop.borrow().clone() else {
            self.state.set(RunnerState::Closed);
            return Ok(());
        };

        if event_loop.is_running() || current::driving() {
            return Err(Error::Reentrancy {
                entry: "Runner::close()",
            });
        }

        let shutdown = shutdown::reconcile(&event_loop, self.entry);
        let closed = event_loop.close();

        let released = (
            self.event_loop.borrow_mut().take(),
            self.context.borrow_mut().take(),
        );
        drop(released);
        self.state.set(RunnerState::Closed);

        debug!(entry = self.entry, "runner closed");
        shutdown.and(closed)
    }

    /// Enters a usage scope.
    ///
    /// The runner is initialized on entry and closed when the returned
    /// guard is dropped, including while unwinding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the runner is closed: a runner is
    /// never reopened.
    pub fn enter(&self) -> Result<RunnerScope<'_>, Error> {
        self.lazy_init()?;
        Ok(RunnerScope { runner: self })
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("state", &self.state.get())
            .field("debug", &self.debug)
            .field("event_loop", &self.event_loop.borrow())
            .finish()
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if self.state.get() == RunnerState::Active {
            if let Err(err) = self.close() {
                warn!(%err, "failed to close runner on drop");
            }
        }
    }
}

/// A usage scope of a [`Runner`], returned by [`Runner::enter`].
///
/// Derefs to the runner. Dropping the scope closes the runner; use
/// [`exit`](Self::exit) to observe the result of closing.
pub struct RunnerScope<'a> {
    runner: &'a Runner,
}

impl RunnerScope<'_> {
    /// Leaves the scope, closing the runner.
    pub fn exit(self) -> Result<(), Error> {
        self.runner.close()
    }
}

impl Deref for RunnerScope<'_> {
    type Target = Runner;

    fn deref(&self) -> &Runner {
        self.runner
    }
}

impl Drop for RunnerScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.runner.close() {
            warn!(%err, "failed to close runner at the end of its scope");
        }
    }
}
