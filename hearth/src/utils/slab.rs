use std::mem::MaybeUninit;

/// A simple slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and
/// returns stable keys that can be reused after removal.
///
/// Internally, it keeps track of:
/// - initialized slots,
/// - free keys,
/// - and uninitialized memory using [`MaybeUninit`].
///
/// The event loop stores its live tasks here: the key doubles as the
/// identifier carried by task wakers, so a wake is a push of a small
/// integer onto the ready queue.
///
/// # Safety
///
/// This type uses `unsafe` internally but provides a safe API: every
/// access to a slot is guarded by the `used` bitmap.
pub(crate) struct Slab<T> {
    /// Storage for items (may contain uninitialized slots).
    items: Vec<MaybeUninit<T>>,
    /// Stack of free keys that can be reused.
    free: Vec<usize>,
    /// Marks whether a slot is currently initialized.
    used: Vec<bool>,
    /// Number of initialized slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with a fixed initial capacity.
    ///
    /// All slots are initially free and uninitialized.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| MaybeUninit::<T>::uninit()).collect();
        // Reversed so that `pop` hands out low keys first.
        let free = (0..size).rev().collect();
        let used = vec![false; size];

        Self {
            items,
            free,
            used,
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its key.
    ///
    /// If a free slot is available, it is reused.
    /// Otherwise, the slab grows exponentially.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items
                .extend((len..new_len).map(|_| MaybeUninit::<T>::uninit()));
            self.free.extend(((len + 1)..new_len).rev());
            self.used.extend((len..new_len).map(|_| false));

            len
        };

        self.items[index] = MaybeUninit::new(item);
        self.used[index] = true;
        self.len += 1;

        index
    }

    /// Removes and returns the value stored at `key`.
    ///
    /// Returns `None` if the slot is out of range or not in use. The slot
    /// becomes free and may be reused by future insertions.
    pub(crate) fn remove(&mut self, key: usize) -> Option<T> {
        if !self.contains(key) {
            return None;
        }

        self.free.push(key);
        self.used[key] = false;
        self.len -= 1;

        // SAFETY: `used[key]` was true, so the slot is initialized; it is
        // marked free above and never read again until rewritten.
        let item = unsafe { self.items[key].assume_init_read() };
        self.items[key] = MaybeUninit::uninit();

        Some(item)
    }

    /// Returns `true` if `key` refers to an initialized slot.
    pub(crate) fn contains(&self, key: usize) -> bool {
        self.used.get(key).copied().unwrap_or(false)
    }

    /// Returns a shared reference to the value at `key`, if any.
    pub(crate) fn get(&self, key: usize) -> Option<&T> {
        if !self.contains(key) {
            return None;
        }

        // SAFETY: guarded by the `used` bitmap.
        Some(unsafe { self.items[key].assume_init_ref() })
    }

    /// Iterates over every initialized value, in key order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items
            .iter()
            .zip(self.used.iter())
            .filter(|(_, used)| **used)
            // SAFETY: only slots flagged as used are yielded.
            .map(|(slot, _)| unsafe { slot.assume_init_ref() })
    }

    /// Returns the number of initialized slots.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Removes every value, returning them in key order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let keys: Vec<usize> = (0..self.items.len()).filter(|k| self.used[*k]).collect();

        keys.into_iter().filter_map(|k| self.remove(k)).collect()
    }
}

impl<T> Drop for Slab<T> {
    /// Drops all initialized elements stored in the slab.
    ///
    /// Uninitialized slots are ignored.
    fn drop(&mut self) {
        for (slot, &used) in self.items.iter_mut().zip(self.used.iter()) {
            if used {
                unsafe {
                    slot.assume_init_drop();
                }
            }
        }
    }
}
