//! Sample types stored in the history series.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single point in a time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint<T> {
    /// Unix timestamp
    pub timestamp: u64,

    pub value: T,
}

/// Pool-level share accounting at one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShareSample {
    pub accepted_shares: u64,

    pub rejected_shares: u64,

    /// Accepted shares gained since the previous snapshot
    pub shares_delta: u64,

    /// Share luck over the configured window, if computable
    pub luck: Option<f64>,
}

/// Aggregate worker health at one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    /// Mean health score across workers, 0..=100
    pub average_score: f64,

    pub online_workers: u32,

    pub total_workers: u32,
}

/// Profitability estimate at one snapshot, all amounts in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EconomicSample {
    pub revenue_per_hour: f64,

    pub power_cost_per_hour: f64,

    pub profit_per_hour: f64,

    /// Electricity price used, cents per kWh
    pub electricity_cents: f64,
}

/// Actual vs expected hashrate for one worker at one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// 1-hour hashrate in TH/s
    pub actual_ths: f64,

    pub expected_ths: Option<f64>,

    pub ratio: Option<f64>,
}

/// Names of the history series, as used in persisted keys and API paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SeriesId {
    Hashrate,
    ShareAnalytics,
    WorkerHealth,
    Economic,
    Performance(String),
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesId::Hashrate => write!(f, "hashrate"),
            SeriesId::ShareAnalytics => write!(f, "share_analytics"),
            SeriesId::WorkerHealth => write!(f, "worker_health"),
            SeriesId::Economic => write!(f, "economic"),
            SeriesId::Performance(worker) => write!(f, "performance/{}", worker),
        }
    }
}

impl FromStr for SeriesId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hashrate" => Ok(SeriesId::Hashrate),
            "share_analytics" => Ok(SeriesId::ShareAnalytics),
            "worker_health" => Ok(SeriesId::WorkerHealth),
            "economic" => Ok(SeriesId::Economic),
            other => match other.strip_prefix("performance/") {
                Some(worker) if !worker.is_empty() => Ok(SeriesId::Performance(worker.to_string())),
                _ => Err(format!("Unknown series: {}", other)),
            },
        }
    }
}
