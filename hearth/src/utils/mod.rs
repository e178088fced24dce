//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the runtime.
//! In particular, it exposes a [`Slab`] allocator used for fast keyed
//! storage of live tasks, and panic payload formatting shared by the task
//! and generator machinery.

mod slab;

pub(crate) use slab::Slab;

use std::any::Any;

/// Extracts a human-readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}
