use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::extract::{
    clean_worker_name, first_field, value_display_hashrate, value_f64, value_str, value_ths,
    value_time, value_u64,
};

/// Get current Unix timestamp in seconds.
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Hashrate averaged over the pool's reporting windows, in TH/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HashrateWindows {
    pub m1: f64,
    pub m5: f64,
    pub h1: f64,
    pub d1: f64,
    pub d7: f64,
}

/// Probability of finding a block within each horizon, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockOdds {
    pub day: f64,
    pub week: f64,
    pub month: f64,
    pub year: f64,
}

/// One entry of the electricity price forecast (cents per kWh).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: String,
    pub price: f64,
}

/// A single worker as reported by the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Name as sent by the pool, including the `<address>.` prefix
    pub raw_name: String,
    /// Identity key with the pool prefix stripped
    pub name: String,
    pub hashrate: HashrateWindows,
    pub accepted_shares: u64,
    pub rejected_shares: u64,
    pub best_share: f64,
    pub last_share_time: Option<DateTime<Utc>>,
}

impl WorkerRecord {
    pub fn from_json(value: &Value) -> Self {
        let raw_name = value_str(first_field(value, &["workername", "worker_name", "name"]));
        let best_share = value_f64(first_field(value, &["bestever", "best_ever"]))
            .max(value_f64(first_field(value, &["bestshare", "best_share"])));

        Self {
            name: clean_worker_name(&raw_name),
            raw_name,
            hashrate: HashrateWindows {
                m1: value_display_hashrate(first_field(value, &["hashrate1m", "hashrate_1m"])),
                m5: value_display_hashrate(first_field(value, &["hashrate5m", "hashrate_5m"])),
                h1: value_display_hashrate(first_field(value, &["hashrate1hr", "hashrate1h"])),
                d1: value_display_hashrate(first_field(value, &["hashrate1d", "hashrate_1d"])),
                d7: value_display_hashrate(first_field(value, &["hashrate7d", "hashrate_7d"])),
            },
            accepted_shares: value_u64(first_field(value, &["shares", "accepted_shares"])),
            rejected_shares: value_u64(first_field(value, &["rejects", "rejected_shares"])),
            best_share,
            last_share_time: value_time(first_field(value, &["lastshare", "last_share_time"])),
        }
    }

    /// True when the worker reports any recent hashrate.
    pub fn is_hashing(&self) -> bool {
        self.hashrate.m1 > 0.0 || self.hashrate.m5 > 0.0
    }
}

/// Normalized, immutable pool reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Unix timestamp when this snapshot was fetched
    pub timestamp: u64,
    pub worker_count: u64,
    pub accepted_shares: u64,
    pub best_share: f64,
    pub hashrate: HashrateWindows,
    pub odds: BlockOdds,
    pub last_share_time: Option<DateTime<Utc>>,
    pub workers: Vec<WorkerRecord>,
    pub future_prices: Vec<PricePoint>,
}

impl PoolSnapshot {
    /// Build a snapshot from the raw endpoint body.
    ///
    /// Missing or malformed fields fall back to zero/empty; unknown fields
    /// are ignored. A non-object body yields an empty snapshot.
    pub fn from_json(value: &Value, fetched_at: u64) -> Self {
        let workers: Vec<WorkerRecord> = first_field(value, &["workers", "worker"])
            .and_then(Value::as_array)
            .map(|items| items.iter().map(WorkerRecord::from_json).collect())
            .unwrap_or_default();

        let worker_count = match first_field(value, &["worker_count", "workers_count"]) {
            Some(count) => value_u64(Some(count)),
            None => workers.len() as u64,
        };

        let future_prices = value
            .get("comed_future_prices")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let price = item.get("price")?;
                        let price = match price {
                            Value::Number(_) | Value::String(_) => value_f64(Some(price)),
                            _ => return None,
                        };
                        Some(PricePoint {
                            time: value_str(item.get("time")),
                            price,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            timestamp: fetched_at,
            worker_count,
            accepted_shares: value_u64(first_field(value, &["accepted_shares", "shares"])),
            best_share: value_f64(first_field(value, &["best_shares", "bestshare", "bestever"])),
            hashrate: HashrateWindows {
                m1: value_ths(value.get("hashrate_1min_ths")),
                m5: value_ths(value.get("hashrate_5min_ths")),
                h1: value_ths(value.get("hashrate_1hr_ths")),
                d1: value_ths(value.get("hashrate_1d_ths")),
                d7: value_ths(value.get("hashrate_7d_ths")),
            },
            odds: BlockOdds {
                day: value_f64(value.get("odds_24hr_percent")),
                week: value_f64(value.get("odds_7d_percent")),
                month: value_f64(value.get("odds_30d_percent")),
                year: value_f64(value.get("odds_1yr_percent")),
            },
            last_share_time: value_time(first_field(value, &["last_share_time", "lastshare"])),
            workers,
            future_prices,
        }
    }

    /// Cleaned worker identities present in this snapshot.
    pub fn worker_ids(&self) -> BTreeSet<&str> {
        self.workers.iter().map(|w| w.name.as_str()).collect()
    }

    pub fn worker(&self, name: &str) -> Option<&WorkerRecord> {
        self.workers.iter().find(|w| w.name == name)
    }

    /// Nearest forecast price in cents per kWh.
    pub fn current_price(&self) -> Option<f64> {
        self.future_prices.first().map(|p| p.price)
    }

    pub fn total_rejected_shares(&self) -> u64 {
        self.workers.iter().map(|w| w.rejected_shares).sum()
    }
}
