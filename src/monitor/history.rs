//! Bounded, insertion-ordered logs
//!
//! Used for the attack history and the ML detection log. Appends are O(1);
//! once full, each append evicts exactly the oldest record.

use std::collections::VecDeque;

use crate::monitor::types::{Finding, MlDetectionRecord};

/// Fixed-capacity FIFO log
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    records: VecDeque<T>,
    capacity: usize,
}

/// Log of findings, newest read first
pub type AttackHistory = BoundedHistory<Finding>;

/// Log of confidence-scored detections
pub type MlDetectionLog = BoundedHistory<MlDetectionRecord>;

impl<T: Clone> BoundedHistory<T> {
    /// A capacity of zero is bumped to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, returning the evicted one if the log was full
    pub fn append(&mut self, record: T) -> Option<T> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        self.records.push_back(record);
        evicted
    }

    /// Up to `k` records, newest first
    pub fn recent(&self, k: usize) -> Vec<T> {
        self.records.iter().rev().take(k).cloned().collect()
    }

    /// Remove everything, returning how many records were dropped
    pub fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    /// All records, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.records.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
