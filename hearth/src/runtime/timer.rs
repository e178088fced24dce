use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;
use std::task::Waker;
use std::time::Instant;

/// State shared between a [`Sleep`](crate::time::Sleep) future and its
/// timer entry.
pub(crate) struct TimerShared {
    /// Waker of the last task that polled the sleep.
    ///
    /// Replaced on every poll, since a suspended generator can be resumed
    /// by a different task than the one that started the sleep.
    waker: RefCell<Waker>,

    /// Set when the sleep future is dropped before its deadline.
    cancelled: Cell<bool>,
}

impl TimerShared {
    pub(crate) fn new(waker: Waker) -> Self {
        Self {
            waker: RefCell::new(waker),
            cancelled: Cell::new(false),
        }
    }

    pub(crate) fn update(&self, waker: &Waker) {
        let mut current = self.waker.borrow_mut();
        if !current.will_wake(waker) {
            *current = waker.clone();
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    pub(crate) fn fire(&self) {
        if !self.is_cancelled() {
            self.waker.borrow().wake_by_ref();
        }
    }
}

/// An entry in the loop's timer queue.
///
/// `TimerEntry` represents a scheduled wake-up at a specific
/// deadline. It is stored inside a binary heap ordered by deadline.
///
/// The entry may be cancelled before it fires.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Waker and cancellation flag shared with the sleep future.
    pub(crate) shared: Rc<TimerShared>,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    /// Two timer entries are equal if their deadlines are equal.
    fn eq(&self, other: &Self) -> bool {
        self.deadline.eq(&other.deadline)
    }
}

impl Ord for TimerEntry {
    /// Orders timer entries by deadline.
    ///
    /// Note that the comparison is **reversed** so that a
    /// `BinaryHeap<TimerEntry>` behaves as a min-heap,
    /// where the earliest deadline is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for TimerEntry {
    /// Partial ordering consistent with [`Ord`].
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
