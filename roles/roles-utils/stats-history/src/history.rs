//! The set of independently capped series kept by the monitor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::{
    EconomicSample, HealthSample, HistoryPoint, PerformanceSample, SeriesId, ShareSample,
};
use crate::windowing::{BoundedSeries, DEFAULT_SERIES_CAPACITY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStore {
    capacity: usize,
    /// Pool 1-minute hashrate, TH/s
    pub hashrate: BoundedSeries<f64>,
    pub share_analytics: BoundedSeries<ShareSample>,
    pub worker_health: BoundedSeries<HealthSample>,
    pub economic: BoundedSeries<EconomicSample>,
    performance: BTreeMap<String, BoundedSeries<PerformanceSample>>,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            hashrate: BoundedSeries::new(capacity),
            share_analytics: BoundedSeries::new(capacity),
            worker_health: BoundedSeries::new(capacity),
            economic: BoundedSeries::new(capacity),
            performance: BTreeMap::new(),
        }
    }

    /// Apply a (possibly different) capacity to every series, e.g. after
    /// restoring persisted history under a new configuration.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.hashrate.set_capacity(capacity);
        self.share_analytics.set_capacity(capacity);
        self.worker_health.set_capacity(capacity);
        self.economic.set_capacity(capacity);
        for series in self.performance.values_mut() {
            series.set_capacity(capacity);
        }
    }

    pub fn append_performance(&mut self, worker: &str, point: HistoryPoint<PerformanceSample>) {
        let capacity = self.capacity;
        self.performance
            .entry(worker.to_string())
            .or_insert_with(|| BoundedSeries::new(capacity))
            .append(point);
    }

    pub fn performance(&self, worker: &str) -> Option<&BoundedSeries<PerformanceSample>> {
        self.performance.get(worker)
    }

    pub fn performance_workers(&self) -> impl Iterator<Item = &str> {
        self.performance.keys().map(String::as_str)
    }

    /// Drop every per-worker series whose newest point is older than
    /// `cutoff`. Returns the names removed.
    pub fn prune_performance(&mut self, cutoff: u64) -> Vec<String> {
        let stale: Vec<String> = self
            .performance
            .iter()
            .filter(|(_, series)| series.latest().map_or(true, |p| p.timestamp < cutoff))
            .map(|(worker, _)| worker.clone())
            .collect();
        for worker in &stale {
            self.performance.remove(worker);
        }
        stale
    }

    /// Points of any series within the trailing window, as JSON values.
    /// Returns `None` for an unknown per-worker series.
    pub fn query_json(&self, id: &SeriesId, window_secs: u64, now: u64) -> Option<Vec<Value>> {
        fn collect<'a, T: Serialize + 'a>(
            points: impl Iterator<Item = &'a HistoryPoint<T>>,
        ) -> Vec<Value> {
            points
                .filter_map(|p| serde_json::to_value(p).ok())
                .collect()
        }

        match id {
            SeriesId::Hashrate => Some(collect(self.hashrate.query(window_secs, now))),
            SeriesId::ShareAnalytics => {
                Some(collect(self.share_analytics.query(window_secs, now)))
            }
            SeriesId::WorkerHealth => Some(collect(self.worker_health.query(window_secs, now))),
            SeriesId::Economic => Some(collect(self.economic.query(window_secs, now))),
            SeriesId::Performance(worker) => self
                .performance
                .get(worker)
                .map(|series| collect(series.query(window_secs, now))),
        }
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}
