//! # Hearth
//!
//! **Hearth** is a single-threaded cooperative async runtime for Rust, built
//! around the lifecycle of its event loop: how a loop is opened, how one unit
//! of top-level work is driven to completion on it, and how everything that
//! work left behind is reconciled before the loop is closed.
//!
//! It provides:
//!
//! - A **[`Runner`]** that owns an event loop, runs top-level work on it one
//!   unit at a time and keeps a [`Context`](context::Context) alive across
//!   runs
//! - A one-shot **[`run`]** entry point that opens, runs and closes a loop
//! - **Deterministic shutdown**: leftover tasks are cancelled and awaited,
//!   their failures reported, and suspended asynchronous generators closed
//! - **Cooperative cancellation** through [`time::sleep`], [`yield_now`] and
//!   [`checkpoint`]
//! - **Ergonomic macros** like `#[hearth::main]` and `#[hearth::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hearth::time::sleep;
//! use std::time::Duration;
//!
//! #[hearth::main]
//! async fn main() {
//!     // Spawn a background task
//!     let handle = hearth::spawn(async {
//!         sleep(Duration::from_millis(100)).await.ok();
//!         println!("Task completed!");
//!     });
//!
//!     // Wait for the task to finish
//!     let _ = handle.await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`asyncgen`]: Asynchronous generators finalized by the loop
//! - [`context`]: Context variables carried across runs
//! - [`task`]: Task handles, spawning and joining
//! - [`time`]: Timers
//! - [`config`]: Loop configuration from the environment

mod error;
mod runner;
mod runtime;
mod utils;

pub mod asyncgen;
pub mod config;
pub mod context;
pub mod time;

pub use error::{Cancelled, Error, Fault, JoinError};
pub use runner::{RootFuture, Runner, RunnerBuilder, RunnerScope, WorkUnit, run, run_with};
pub use runtime::task;
pub use runtime::task::{checkpoint, spawn};
pub use runtime::yield_now::yield_now;
pub use runtime::{EventLoop, ExceptionRecord, running_loop};

pub use hearth_macros::{main, test};
