//! Ambient key/value state carried across awaits.
//!
//! A [`Context`] is a shared handle to a copy-on-write map of
//! [`ContextVar`] values. The event loop installs a task's context as the
//! *current* one while polling that task, so `ContextVar::get` and
//! `ContextVar::set` always act on the context of the task being run.
//!
//! Every task receives its context explicitly when it is scheduled:
//! - a [`Runner`](crate::Runner) hands the same context to every root task
//!   it runs, which is what lets state flow from one `run` to the next,
//! - [`spawn`](crate::spawn) gives the child a [`copy`](Context::copy) of the
//!   spawner's current context, so children never leak writes upward.
//!
//! Outside of any loop the current context is a per-thread root context.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Vars = HashMap<usize, Rc<dyn Any>>;

static NEXT_KEY: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Context installed by the task currently being polled, if any.
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };

    /// Fallback context for code running outside the loop.
    static ROOT: Context = Context::new();
}

/// A mapping from context variables to their values.
///
/// Cloning a `Context` clones the *handle*: both clones observe each
/// other's writes. Use [`Context::copy`] to take an independent snapshot.
#[derive(Clone, Default)]
pub struct Context {
    vars: Rc<RefCell<Rc<Vars>>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an independent snapshot of this context.
    ///
    /// The underlying map is shared until either side writes to it.
    pub fn copy(&self) -> Self {
        Self {
            vars: Rc::new(RefCell::new(Rc::clone(&self.vars.borrow()))),
        }
    }

    /// Runs `f` with this context installed as the current one.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// Returns the value `var` holds in this context, ignoring its default.
    pub fn get<T: Clone + 'static>(&self, var: &ContextVar<T>) -> Option<T> {
        self.vars
            .borrow()
            .get(&var.key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Returns `true` if `var` has been set in this context.
    pub fn contains<T>(&self, var: &ContextVar<T>) -> bool {
        self.vars.borrow().contains_key(&var.key)
    }

    /// Number of variables set in this context.
    pub fn len(&self) -> usize {
        self.vars.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if both handles refer to the same context.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.vars, &other.vars)
    }

    pub(crate) fn enter(&self) -> ContextGuard {
        let prev = CURRENT.with(|current| current.replace(Some(self.clone())));
        ContextGuard { prev }
    }

    fn set_raw(&self, key: usize, value: Rc<dyn Any>) {
        let mut vars = self.vars.borrow_mut();
        Rc::make_mut(&mut *vars).insert(key, value);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("len", &self.len()).finish()
    }
}

/// Restores the previously installed context when dropped.
pub(crate) struct ContextGuard {
    prev: Option<Context>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|current| *current.borrow_mut() = prev);
    }
}

/// Returns a handle to the current context.
pub(crate) fn current() -> Context {
    CURRENT
        .with(|current| current.borrow().clone())
        .unwrap_or_else(|| ROOT.with(Context::clone))
}

/// Returns a snapshot of the current context.
pub fn copy_context() -> Context {
    current().copy()
}

/// A variable whose value lives in the current [`Context`].
///
/// # Examples
///
/// ```rust,ignore
/// let request_id = ContextVar::new("request_id", 0u64);
///
/// request_id.set(7);
/// assert_eq!(request_id.get(), 7);
/// ```
#[derive(Clone)]
pub struct ContextVar<T> {
    key: usize,
    name: &'static str,
    default: T,
}

impl<T: Clone + 'static> ContextVar<T> {
    /// Creates a new variable with the value it reports when unset.
    pub fn new(name: &'static str, default: T) -> Self {
        Self {
            key: NEXT_KEY.fetch_add(1, Ordering::Relaxed),
            name,
            default,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the value in the current context, or the default.
    pub fn get(&self) -> T {
        current().get(self).unwrap_or_else(|| self.default.clone())
    }

    /// Sets the value in the current context.
    pub fn set(&self, value: T) {
        current().set_raw(self.key, Rc::new(value));
    }
}

impl<T> fmt::Debug for ContextVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextVar")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_is_isolated_from_the_original() {
        let var = ContextVar::new("var", 0);
        let ctx = Context::new();
        ctx.run(|| var.set(1));

        let snapshot = ctx.copy();
        snapshot.run(|| var.set(2));

        assert_eq!(ctx.get(&var), Some(1));
        assert_eq!(snapshot.get(&var), Some(2));
    }

    #[test]
    fn clones_share_writes() {
        let var = ContextVar::new("var", 0);
        let ctx = Context::new();
        let handle = ctx.clone();

        handle.run(|| var.set(5));

        assert!(ctx.ptr_eq(&handle));
        assert_eq!(ctx.get(&var), Some(5));
    }

    #[test]
    fn run_restores_the_previous_context() {
        let var = ContextVar::new("var", -1);
        let outer = Context::new();
        let inner = Context::new();

        outer.run(|| {
            var.set(10);
            inner.run(|| {
                assert_eq!(var.get(), -1);
                var.set(20);
            });
            assert_eq!(var.get(), 10);
        });

        assert_eq!(inner.get(&var), Some(20));
    }

    #[test]
    fn default_is_not_stored() {
        let var = ContextVar::new("var", "fallback");
        let ctx = Context::new();

        ctx.run(|| assert_eq!(var.get(), "fallback"));
        assert!(!ctx.contains(&var));
        assert!(ctx.is_empty());
    }

    #[test]
    fn copy_context_snapshots_the_current_one() {
        let var = ContextVar::new("var", 0);
        let ctx = Context::new();

        let snapshot = ctx.run(|| {
            var.set(3);
            copy_context()
        });

        assert!(!snapshot.ptr_eq(&ctx));
        assert_eq!(snapshot.get(&var), Some(3));
        assert_eq!(snapshot.len(), 1);
    }
}
