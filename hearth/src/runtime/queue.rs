use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Queue of task keys that are ready to be polled.
///
/// Wakers push onto it from any thread; the loop drains it on its own
/// thread and parks on the condition variable while it is empty.
pub(crate) struct ReadyQueue {
    /// Keys of woken tasks, in wake order.
    queue: Mutex<VecDeque<usize>>,

    /// Signalled on every push so a parked loop resumes.
    condvar: Condvar,
}

impl ReadyQueue {
    /// Creates a new empty queue.
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
        }
    }

    /// Pushes a task key and wakes the loop if it is parked.
    pub(crate) fn push(&self, key: usize) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(key);
        self.condvar.notify_one();
    }

    /// Takes every key queued so far.
    ///
    /// Keys pushed while the returned batch is being processed wait for
    /// the next drain.
    pub(crate) fn drain(&self) -> Vec<usize> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    /// Parks the current thread until a key is pushed or `timeout`
    /// elapses. With no timeout, waits until the next push.
    ///
    /// Returns immediately if the queue is not empty.
    pub(crate) fn park(&self, timeout: Option<Duration>) {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        if !queue.is_empty() {
            return;
        }

        match timeout {
            Some(timeout) => {
                let (_queue, _timed_out) = self
                    .condvar
                    .wait_timeout(queue, timeout)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            None => {
                let _queue = self
                    .condvar
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    /// Discards every queued key.
    pub(crate) fn clear(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::ReadyQueue;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn drain_preserves_push_order() {
        let queue = ReadyQueue::new();
        queue.push(2);
        queue.push(0);
        queue.push(1);

        assert_eq!(queue.drain(), vec![2, 0, 1]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn park_returns_when_work_is_pending() {
        let queue = ReadyQueue::new();
        queue.push(4);

        let started = Instant::now();
        queue.park(None);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn park_times_out() {
        let queue = ReadyQueue::new();

        let started = Instant::now();
        queue.park(Some(Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn push_from_another_thread_unparks() {
        let queue = Arc::new(ReadyQueue::new());
        let remote = queue.clone();

        let pusher = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.push(9);
        });

        while queue.drain().is_empty() {
            queue.park(Some(Duration::from_millis(500)));
        }
        pusher.join().unwrap();
    }

    #[test]
    fn untimed_park_releases_the_lock_after_a_push() {
        let queue = Arc::new(ReadyQueue::new());
        let remote = queue.clone();

        let pusher = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.push(3);
        });

        queue.park(None);
        pusher.join().unwrap();

        queue.push(5);
        assert_eq!(queue.drain(), vec![3, 5]);
    }
}
