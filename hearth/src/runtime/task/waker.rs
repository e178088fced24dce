use crate::runtime::queue::ReadyQueue;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Wake, Waker};

/// Waker state for one task.
///
/// A waker only carries the task's slab key and a handle to the ready
/// queue, never the task itself: task futures are not `Send`, wakers are,
/// and may be invoked from any thread.
pub(crate) struct TaskWaker {
    /// Slab key of the task inside its event loop.
    key: usize,

    /// Set while the key sits in the ready queue.
    ///
    /// Shared with the task, which clears it right before being polled so
    /// that a wake during the poll queues it again.
    queued: Arc<AtomicBool>,

    /// Ready queue of the owning loop.
    queue: Arc<ReadyQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if !self.queued.swap(true, Ordering::AcqRel) {
            self.queue.push(self.key);
        }
    }
}

/// Creates the [`Waker`] for the task stored under `key`.
pub(crate) fn make_waker(key: usize, queued: Arc<AtomicBool>, queue: Arc<ReadyQueue>) -> Waker {
    Waker::from(Arc::new(TaskWaker { key, queued, queue }))
}
