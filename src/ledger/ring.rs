use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity transaction log. Appending to a full log drops the oldest
/// entry first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RingLog<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T> RingLog<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }
}

impl<T: Clone> RingLog<T> {
    /// Up to `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<T> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_oldest_when_full() {
        let mut log = RingLog::with_capacity(3);
        for i in 1..=5 {
            log.push(i);
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(log.recent(2), vec![5, 4]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut log = RingLog::with_capacity(0);
        log.push("a");
        assert!(log.is_empty());
    }

    #[test]
    fn test_serde_keeps_capacity() {
        let mut log = RingLog::with_capacity(2);
        log.push(1u32);
        log.push(2);
        log.push(3);

        let json = serde_json::to_string(&log).unwrap();
        let mut restored: RingLog<u32> = serde_json::from_str(&json).unwrap();
        restored.push(4);

        assert_eq!(restored.capacity(), 2);
        assert_eq!(restored.recent(5), vec![4, 3]);
    }
}
