//! Fixed-capacity history buffer shared by every temporal component.

/// Append-only ring buffer over a preallocated arena.
///
/// Once full, each `push` overwrites the oldest slot. Iteration and
/// snapshots are always ordered oldest → newest with no gaps.
#[derive(Debug, Clone)]
pub struct RingHistory<T> {
    slots: Vec<T>,
    capacity: usize,
    // Index of the oldest element once the arena is full; 0 before that.
    head: usize,
}

impl<T> RingHistory<T> {
    /// Creates an empty buffer. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[self.head] = item;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Most recently pushed element.
    pub fn latest(&self) -> Option<&T> {
        let len = self.slots.len();
        if len == 0 {
            return None;
        }
        self.slots.get((self.head + len - 1) % len)
    }

    /// Iterates oldest → newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter())
    }

    /// Resets occupancy to zero, keeping the arena allocation.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> RingHistory<T> {
    /// Ordered copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Same as [`snapshot`](Self::snapshot) but reuses `out`'s storage.
    pub fn snapshot_into(&self, out: &mut Vec<T>) {
        out.clear();
        out.extend(self.iter().cloned());
    }
}
