//! Fixed-capacity buffer of the fixes received before logging starts.

use std::collections::VecDeque;

/// FIFO that drops its oldest entry once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, dropping the oldest one if the buffer is full.
    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Oldest entry still held.
    #[must_use]
    pub fn oldest(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Remove and return all entries, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.entries.drain(..).collect()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the buffer holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_keeps_most_recent_in_order() {
        let mut ring = RingBuffer::new(60);
        for i in 0..100 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 60);
        assert_eq!(ring.oldest(), Some(&40));

        let drained = ring.drain();
        assert_eq!(drained, (40..100).collect::<Vec<_>>());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_partial_fill() {
        let mut ring = RingBuffer::new(4);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.drain(), vec!["a", "b"]);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut ring = RingBuffer::new(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.drain(), vec![2]);
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::new(3);
        ring.push(1);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.oldest(), None);
    }
}
