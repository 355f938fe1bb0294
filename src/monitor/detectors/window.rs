//! Timestamp window tolerant of late events

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Event timestamps kept in ascending order. Feeds may deliver events out of
/// order, so counts are taken over windows that actually contain the event
/// rather than over whatever sits in the deque.
#[derive(Debug, Default, Clone)]
pub struct TimeWindow {
    stamps: VecDeque<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `at` and return the densest `span`-long window containing it
    pub fn record(&mut self, at: DateTime<Utc>, span: Duration) -> usize {
        let position = self.stamps.partition_point(|ts| *ts <= at);
        self.stamps.insert(position, at);

        // nothing at or before `newest - span` can share a window with a future event
        if let Some(newest) = self.stamps.back().copied() {
            let horizon = newest - span;
            while self.stamps.front().map_or(false, |ts| *ts <= horizon) {
                self.stamps.pop_front();
            }
        }

        self.densest_around(at, span)
    }

    /// Largest count over windows `(end - span, end]` that contain `at`
    pub fn densest_around(&self, at: DateTime<Utc>, span: Duration) -> usize {
        let from = self.stamps.partition_point(|ts| *ts < at);
        let until = at + span;
        self.stamps
            .iter()
            .skip(from)
            .take_while(|end| **end < until)
            .map(|end| self.count_in(*end, span))
            .max()
            .unwrap_or(0)
    }

    /// Events in `(at - span, at]`
    pub fn count_in(&self, at: DateTime<Utc>, span: Duration) -> usize {
        let start = at - span;
        let lower = self.stamps.partition_point(|ts| *ts <= start);
        let upper = self.stamps.partition_point(|ts| *ts <= at);
        upper.saturating_sub(lower)
    }

    /// Most recent timestamp recorded
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.stamps.back().copied()
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}
