//! Rolling history, derived analytics and state persistence for the pool monitor.
//!
//! Series are bounded in memory and persisted as JSON blobs through a
//! [`StateStore`]. Analytics are pure functions over snapshots and series.

pub mod analytics;
pub mod history;
pub mod storage;
pub mod types;
pub mod windowing;

pub use analytics::{
    LuckBand, NetworkConditions, PerformanceBand, PerformanceRecord, PerformanceTrend,
    PowerModel, Profitability, WorkerHealth,
};
pub use history::HistoryStore;
pub use storage::{
    keys, load_json, save_json, MemoryStateStore, SqliteStateStore, StateStore, StorageError,
};
pub use types::{
    EconomicSample, HealthSample, HistoryPoint, PerformanceSample, SeriesId, ShareSample,
};
pub use windowing::{BoundedSeries, DEFAULT_SERIES_CAPACITY};
