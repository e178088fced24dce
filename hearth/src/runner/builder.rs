use super::Runner;
use crate::context::Context;
use crate::runtime::EventLoop;

/// Factory creating the loop a runner drives.
pub(crate) type LoopFactory = Box<dyn FnOnce() -> EventLoop>;

/// Builder for configuring and creating a [`Runner`].
///
/// `RunnerBuilder` allows customizing the runner before it exists. No
/// loop is created here: the runner creates it on first use.
///
/// # Examples
///
/// ```rust,ignore
/// let runner = RunnerBuilder::new()
///     .debug(true)
///     .build();
/// ```
pub struct RunnerBuilder {
    /// Debug flag applied to the loop, if any.
    debug: Option<bool>,

    loop_factory: Option<LoopFactory>,

    /// Context installed in every run, instead of a snapshot.
    context: Option<Context>,

    /// Entry point named in shutdown reports.
    entry: &'static str,
}

impl RunnerBuilder {
    /// Creates a new `RunnerBuilder` with default configuration.
    ///
    /// By default the loop is created with [`EventLoop::new`], keeps the
    /// debug mode it was configured with, and the runner captures the
    /// current context on first use.
    pub fn new() -> Self {
        Self {
            debug: None,
            loop_factory: None,
            context: None,
            entry: "hearth::Runner",
        }
    }

    /// Forces debug mode on or off on the runner's loop.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.debug = Some(enabled);
        self
    }

    /// Sets the function creating the runner's loop.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let runner = RunnerBuilder::new()
    ///     .loop_factory(|| EventLoop::with_config(LoopConfig::default()))
    ///     .build();
    /// ```
    pub fn loop_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce() -> EventLoop + 'static,
    {
        self.loop_factory = Some(Box::new(factory));
        self
    }

    /// Sets the context every run of the runner executes in.
    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub(crate) fn entry_point(mut self, entry: &'static str) -> Self {
        self.entry = entry;
        self
    }

    /// Builds the runner with the configured options.
    pub fn build(self) -> Runner {
        Runner::from_parts(self.debug, self.loop_factory, self.context, self.entry)
    }
}

impl Default for RunnerBuilder {
    /// Creates a default `RunnerBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
