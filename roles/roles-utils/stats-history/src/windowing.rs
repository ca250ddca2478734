//! Bounded rolling time series.
//!
//! Each series keeps at most `capacity` points in chronological order and
//! silently evicts the oldest point when full. Queries filter by a trailing
//! time window and never allocate.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::HistoryPoint;

/// Default horizon: 288 points is 24h at a 5-minute cadence.
pub const DEFAULT_SERIES_CAPACITY: usize = 288;

/// Get current Unix timestamp in seconds.
pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedSeries<T> {
    points: VecDeque<HistoryPoint<T>>,
    capacity: usize,
}

impl<T> BoundedSeries<T> {
    /// Create an empty series. A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity.min(DEFAULT_SERIES_CAPACITY)),
            capacity,
        }
    }

    /// Insert a point, keeping chronological order, then evict from the
    /// front until the series fits its capacity.
    pub fn append(&mut self, point: HistoryPoint<T>) {
        match self.points.back() {
            Some(last) if point.timestamp < last.timestamp => {
                let idx = self
                    .points
                    .partition_point(|p| p.timestamp <= point.timestamp);
                self.points.insert(idx, point);
            }
            _ => self.points.push_back(point),
        }

        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn push(&mut self, timestamp: u64, value: T) {
        self.append(HistoryPoint { timestamp, value });
    }

    /// Points with `timestamp >= now - window_secs`, oldest first.
    ///
    /// The iterator borrows the series, so it can be cloned and restarted.
    pub fn query(
        &self,
        window_secs: u64,
        now: u64,
    ) -> impl Iterator<Item = &HistoryPoint<T>> + Clone + '_ {
        let cutoff = now.saturating_sub(window_secs);
        let start = self.points.partition_point(|p| p.timestamp < cutoff);
        self.points.range(start..)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryPoint<T>> + Clone + '_ {
        self.points.iter()
    }

    /// The newest `n` points, oldest first.
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &HistoryPoint<T>> + Clone + '_ {
        let start = self.points.len().saturating_sub(n);
        self.points.range(start..)
    }

    pub fn latest(&self) -> Option<&HistoryPoint<T>> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the cap; shrinking evicts the oldest points immediately.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }
}

impl<T: Copy> BoundedSeries<T> {
    /// Values of the newest `n` points, oldest first.
    pub fn recent_values(&self, n: usize) -> Vec<T> {
        self.last_n(n).map(|p| p.value).collect()
    }
}

impl<T> Default for BoundedSeries<T> {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}
