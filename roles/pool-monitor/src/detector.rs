//! Change detection between two consecutive snapshots.
//!
//! Detection is a pure comparison: it never decides whether anything is
//! shown to the user. That is left to the notification dispatcher.

use notification_hooks::{ActivityEvent, EventKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use stats::PoolSnapshot;
use web_utils::{format_count, format_difficulty, format_hashrate_ths, format_percent_change};

/// Accepted-share counts that are celebrated once crossed.
pub const SHARE_MILESTONES: [u64; 9] = [
    1_000, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000, 1_000_000,
];

/// Pool 1-minute hashrate thresholds, TH/s.
pub const HASHRATE_MILESTONES_THS: [f64; 7] = [10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// Relative 1-minute hashrate change that counts as significant.
pub const HASHRATE_CHANGE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    Low,
    Mid,
    High,
}

impl PriceTier {
    /// Tier for a price in cents per kWh: up to 4 is low, up to 9 is mid.
    pub fn from_cents(cents: f64) -> Self {
        if cents <= 4.0 {
            PriceTier::Low
        } else if cents <= 9.0 {
            PriceTier::Mid
        } else {
            PriceTier::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTier::Low => "low",
            PriceTier::Mid => "mid",
            PriceTier::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectedChange {
    Started {
        worker_count: u64,
        hashrate_ths: f64,
    },
    WorkerOnline {
        worker: String,
    },
    WorkerOffline {
        worker: String,
    },
    WorkerCountChanged {
        previous: u64,
        current: u64,
    },
    HashrateChange {
        previous_ths: f64,
        current_ths: f64,
        relative: f64,
    },
    HashrateMilestone {
        threshold_ths: f64,
    },
    ShareMilestone {
        threshold: u64,
    },
    ShareFound {
        delta: u64,
        total: u64,
    },
    BestShare {
        previous: f64,
        current: f64,
    },
    PriceTierChange {
        previous: PriceTier,
        current: PriceTier,
        price_cents: f64,
    },
}

impl DetectedChange {
    pub fn kind(&self) -> EventKind {
        match self {
            DetectedChange::Started { .. }
            | DetectedChange::HashrateMilestone { .. }
            | DetectedChange::ShareMilestone { .. }
            | DetectedChange::BestShare { .. } => EventKind::Milestone,
            DetectedChange::WorkerOnline { .. } => EventKind::WorkerOnline,
            DetectedChange::WorkerOffline { .. } => EventKind::WorkerOffline,
            DetectedChange::WorkerCountChanged { previous, current } => {
                if current > previous {
                    EventKind::WorkerOnline
                } else {
                    EventKind::WorkerOffline
                }
            }
            DetectedChange::HashrateChange { .. } => EventKind::HashrateChange,
            DetectedChange::ShareFound { .. } => EventKind::ShareFound,
            DetectedChange::PriceTierChange { .. } => EventKind::PriceAlert,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            DetectedChange::Started { .. } => "Monitoring started",
            DetectedChange::WorkerOnline { .. } => "Worker online",
            DetectedChange::WorkerOffline { .. } => "Worker offline",
            DetectedChange::WorkerCountChanged { .. } => "Worker count changed",
            DetectedChange::HashrateChange { .. } => "Hashrate change",
            DetectedChange::HashrateMilestone { .. } => "Hashrate milestone",
            DetectedChange::ShareMilestone { .. } => "Share milestone",
            DetectedChange::ShareFound { .. } => "Share found",
            DetectedChange::BestShare { .. } => "New best share",
            DetectedChange::PriceTierChange { .. } => "Electricity price alert",
        }
    }

    fn message(&self) -> String {
        match self {
            DetectedChange::Started {
                worker_count,
                hashrate_ths,
            } => format!(
                "Watching {} workers at {}",
                worker_count,
                format_hashrate_ths(*hashrate_ths)
            ),
            DetectedChange::WorkerOnline { worker } => format!("{} is online", worker),
            DetectedChange::WorkerOffline { worker } => format!("{} went offline", worker),
            DetectedChange::WorkerCountChanged { previous, current } => {
                format!("Worker count changed from {} to {}", previous, current)
            }
            DetectedChange::HashrateChange {
                current_ths,
                relative,
                ..
            } => format!(
                "Hashrate {} to {}",
                format_percent_change(*relative),
                format_hashrate_ths(*current_ths)
            ),
            DetectedChange::HashrateMilestone { threshold_ths } => {
                format!("Pool hashrate reached {}", format_hashrate_ths(*threshold_ths))
            }
            DetectedChange::ShareMilestone { threshold } => {
                format!("{} accepted shares", format_count(*threshold))
            }
            DetectedChange::ShareFound { delta, total } => {
                format!("+{} shares ({} total)", delta, format_count(*total))
            }
            DetectedChange::BestShare { current, .. } => {
                format!("Best share is now {}", format_difficulty(*current))
            }
            DetectedChange::PriceTierChange {
                current,
                price_cents,
                ..
            } => format!(
                "Electricity price is {} ({:.1}¢/kWh)",
                current.as_str(),
                price_cents
            ),
        }
    }

    /// Activity log entry for this change. The payload is the change itself.
    pub fn into_event(self, timestamp: u64) -> ActivityEvent {
        let payload = serde_json::to_value(&self).unwrap_or_else(|_| json!({}));
        ActivityEvent::new(self.kind(), self.title(), self.message(), timestamp)
            .with_payload(payload)
    }
}

fn crossed<T: PartialOrd + Copy>(thresholds: &[T], previous: T, current: T) -> Vec<T> {
    thresholds
        .iter()
        .copied()
        .filter(|t| previous < *t && current >= *t)
        .collect()
}

/// Compare `current` against `previous`.
///
/// Without a previous snapshot only a single `Started` change is produced.
/// Changes come out in a fixed order: worker set, worker count, hashrate,
/// milestones, shares, best share, price.
pub fn detect_changes(previous: Option<&PoolSnapshot>, current: &PoolSnapshot) -> Vec<DetectedChange> {
    let previous = match previous {
        Some(previous) => previous,
        None => {
            return vec![DetectedChange::Started {
                worker_count: current.worker_count,
                hashrate_ths: current.hashrate.m1,
            }]
        }
    };

    let mut changes = Vec::new();

    let before = previous.worker_ids();
    let after = current.worker_ids();
    for worker in after.difference(&before) {
        changes.push(DetectedChange::WorkerOnline {
            worker: worker.to_string(),
        });
    }
    for worker in before.difference(&after) {
        changes.push(DetectedChange::WorkerOffline {
            worker: worker.to_string(),
        });
    }

    // Only reported when the identity diff does not already explain it
    if before == after && previous.worker_count != current.worker_count {
        changes.push(DetectedChange::WorkerCountChanged {
            previous: previous.worker_count,
            current: current.worker_count,
        });
    }

    let prev_ths = previous.hashrate.m1;
    let cur_ths = current.hashrate.m1;
    if prev_ths.is_finite() && prev_ths > 0.0 && cur_ths.is_finite() {
        let relative = (cur_ths - prev_ths) / prev_ths;
        if relative.abs() > HASHRATE_CHANGE_THRESHOLD {
            changes.push(DetectedChange::HashrateChange {
                previous_ths: prev_ths,
                current_ths: cur_ths,
                relative,
            });
        }
    }

    for threshold_ths in crossed(&HASHRATE_MILESTONES_THS, prev_ths, cur_ths) {
        changes.push(DetectedChange::HashrateMilestone { threshold_ths });
    }

    for threshold in crossed(
        &SHARE_MILESTONES,
        previous.accepted_shares,
        current.accepted_shares,
    ) {
        changes.push(DetectedChange::ShareMilestone { threshold });
    }

    if current.accepted_shares > previous.accepted_shares {
        changes.push(DetectedChange::ShareFound {
            delta: current.accepted_shares - previous.accepted_shares,
            total: current.accepted_shares,
        });
    }

    if current.best_share > previous.best_share {
        changes.push(DetectedChange::BestShare {
            previous: previous.best_share,
            current: current.best_share,
        });
    }

    if let (Some(before), Some(after)) = (previous.current_price(), current.current_price()) {
        let (from, to) = (PriceTier::from_cents(before), PriceTier::from_cents(after));
        if from != to {
            changes.push(DetectedChange::PriceTierChange {
                previous: from,
                current: to,
                price_cents: after,
            });
        }
    }

    changes
}
