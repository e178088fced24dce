//! Time utilities.
//!
//! This module provides timers driven by the running event loop.
//!
//! It includes:
//! - [`sleep`] for suspending a task until a deadline,
//! - [`Sleep`], the future it returns.

mod sleep;

#[doc(inline)]
pub use sleep::{Sleep, sleep};
