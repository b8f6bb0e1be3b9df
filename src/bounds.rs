//! Sub-sequence bounds
//!
//! A queue, a priority level and a prefix group are each one ordered run of
//! IDs described by `(head, tail]`: `head` is the ID just before the oldest
//! live record and `tail` the ID of the newest. An empty run has
//! `head == tail`.

/// `(head, tail]` bounds of one FIFO sub-sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    pub head: u64,
    pub tail: u64,
}

impl Bounds {
    /// Bounds covering the live IDs `first..=last`
    pub fn spanning(first: u64, last: u64) -> Self {
        Self {
            head: first.saturating_sub(1),
            tail: last,
        }
    }

    pub fn len(&self) -> u64 {
        self.tail - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Whether `id` is live
    pub fn contains(&self, id: u64) -> bool {
        self.head < id && id <= self.tail
    }

    /// ID of the oldest live record
    pub fn front(&self) -> u64 {
        self.head + 1
    }

    /// ID the next enqueue will receive
    pub fn next_id(&self) -> u64 {
        self.tail + 1
    }

    /// ID `offset` places after the oldest, if live
    pub fn id_at(&self, offset: u64) -> Option<u64> {
        if offset < self.len() {
            Some(self.head + 1 + offset)
        } else {
            None
        }
    }
}
