//! Derived analytics over the current snapshot and bounded history.
//!
//! Everything here is a pure function of its arguments; no state is kept
//! between calls.

use serde::{Deserialize, Serialize};

use crate::types::PerformanceSample;
use crate::windowing::BoundedSeries;

/// Target Bitcoin block interval in seconds.
pub const BLOCK_TIME_SECS: f64 = 600.0;

pub const BLOCKS_PER_HOUR: f64 = 3600.0 / BLOCK_TIME_SECS;

/// Minimum number of samples before a trend is classified.
pub const TREND_MIN_POINTS: usize = 24;

/// Number of recent samples used for stability and uptime.
pub const HEALTH_SAMPLE_WINDOW: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LuckBand {
    VeryLucky,
    Lucky,
    Average,
    Unlucky,
    VeryUnlucky,
}

impl LuckBand {
    pub fn classify(luck: f64) -> Self {
        if luck >= 1.2 {
            LuckBand::VeryLucky
        } else if luck >= 1.05 {
            LuckBand::Lucky
        } else if luck >= 0.95 {
            LuckBand::Average
        } else if luck >= 0.8 {
            LuckBand::Unlucky
        } else {
            LuckBand::VeryUnlucky
        }
    }
}

/// Observed shares over expected shares for the window.
///
/// Expected shares are `hashrate_ths * window_secs / BLOCK_TIME_SECS`.
/// Returns `None` when nothing is expected (no hashrate or empty window).
pub fn share_luck(observed_shares: u64, hashrate_ths: f64, window_secs: u64) -> Option<f64> {
    let expected = hashrate_ths * window_secs as f64 / BLOCK_TIME_SECS;
    if !expected.is_finite() || expected <= 0.0 {
        return None;
    }
    Some(observed_shares as f64 / expected)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTrend {
    Improving,
    Stable,
    Declining,
    Critical,
}

impl PerformanceTrend {
    /// Multiplier applied to the health score.
    pub fn factor(self) -> f64 {
        match self {
            PerformanceTrend::Improving => 1.1,
            PerformanceTrend::Stable => 1.0,
            PerformanceTrend::Declining => 0.9,
            PerformanceTrend::Critical => 0.7,
        }
    }

    /// Classify a relative hashrate change (`0.05` is +5%).
    pub fn from_change(change: f64) -> Self {
        if !change.is_finite() {
            PerformanceTrend::Stable
        } else if change >= 0.05 {
            PerformanceTrend::Improving
        } else if change <= -0.20 {
            PerformanceTrend::Critical
        } else if change <= -0.05 {
            PerformanceTrend::Declining
        } else {
            PerformanceTrend::Stable
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Trend over the newest `TREND_MIN_POINTS` samples: mean of the newer half
/// against the mean of the older half. Fewer samples default to `Stable`.
pub fn performance_trend(samples: &[f64]) -> PerformanceTrend {
    if samples.len() < TREND_MIN_POINTS {
        return PerformanceTrend::Stable;
    }
    let recent = &samples[samples.len() - TREND_MIN_POINTS..];
    let (older, newer) = recent.split_at(TREND_MIN_POINTS / 2);
    let baseline = mean(older);
    if !baseline.is_finite() || baseline <= 0.0 {
        return PerformanceTrend::Stable;
    }
    PerformanceTrend::from_change((mean(newer) - baseline) / baseline)
}

/// Hashrate stability in [0, 100]: `100 * (1 - stddev / mean)`.
pub fn hashrate_stability(samples: &[f64]) -> f64 {
    let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    let avg = mean(&finite);
    if avg <= 0.0 {
        return 0.0;
    }
    let variance = finite.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / finite.len() as f64;
    let cv = variance.sqrt() / avg;
    clamp_score(100.0 * (1.0 - cv))
}

/// Percentage of samples with a nonzero hashrate.
pub fn uptime_percent(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let up = samples.iter().filter(|v| v.is_finite() && **v > 0.0).count();
    100.0 * up as f64 / samples.len() as f64
}

/// Share submission proxy: accepted / (accepted + rejected) as a percentage.
/// A worker that has submitted nothing scores zero.
pub fn acceptance_score(accepted: u64, rejected: u64) -> f64 {
    let total = accepted.saturating_add(rejected);
    if total == 0 {
        return 0.0;
    }
    100.0 * accepted as f64 / total as f64
}

fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Weighted health: 40% stability, 40% uptime, 20% share score, scaled by
/// the trend factor and clamped to [0, 100].
pub fn health_score(stability: f64, uptime: f64, share_score: f64, trend: PerformanceTrend) -> f64 {
    let base = 0.4 * clamp_score(stability) + 0.4 * clamp_score(uptime) + 0.2 * clamp_score(share_score);
    clamp_score(base * trend.factor())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub worker: String,
    pub stability: f64,
    pub uptime: f64,
    pub share_score: f64,
    pub trend: PerformanceTrend,
    pub score: f64,
}

/// Health of one worker from its performance history and share counters.
pub fn worker_health(
    worker: &str,
    series: &BoundedSeries<PerformanceSample>,
    accepted: u64,
    rejected: u64,
) -> WorkerHealth {
    let all: Vec<f64> = series.iter().map(|p| p.value.actual_ths).collect();
    let recent = &all[all.len().saturating_sub(HEALTH_SAMPLE_WINDOW)..];

    let stability = hashrate_stability(recent);
    let uptime = uptime_percent(recent);
    let share_score = acceptance_score(accepted, rejected);
    let trend = performance_trend(&all);

    WorkerHealth {
        worker: worker.to_string(),
        stability,
        uptime,
        share_score,
        trend,
        score: health_score(stability, uptime, share_score, trend),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceBand {
    Excellent,
    Good,
    Warning,
    Poor,
    Offline,
    /// No baseline to compare against
    Unknown,
}

impl PerformanceBand {
    pub fn classify(ratio: Option<f64>) -> Self {
        match ratio {
            Some(r) if r.is_finite() => {
                if r >= 0.95 {
                    PerformanceBand::Excellent
                } else if r >= 0.85 {
                    PerformanceBand::Good
                } else if r >= 0.70 {
                    PerformanceBand::Warning
                } else if r >= 0.10 {
                    PerformanceBand::Poor
                } else {
                    PerformanceBand::Offline
                }
            }
            _ => PerformanceBand::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub worker: String,
    pub actual_ths: f64,
    pub expected_ths: Option<f64>,
    pub ratio: Option<f64>,
    pub band: PerformanceBand,
}

impl PerformanceRecord {
    pub fn new(worker: &str, actual_ths: f64, expected_ths: Option<f64>) -> Self {
        let expected_ths = expected_ths.filter(|e| e.is_finite() && *e > 0.0);
        let ratio = expected_ths.map(|expected| actual_ths.max(0.0) / expected);
        Self {
            worker: worker.to_string(),
            actual_ths,
            expected_ths,
            ratio,
            band: PerformanceBand::classify(ratio),
        }
    }

    pub fn sample(&self) -> PerformanceSample {
        PerformanceSample {
            actual_ths: self.actual_ths,
            expected_ths: self.expected_ths,
            ratio: self.ratio,
        }
    }
}

/// Network-wide constants supplied from outside (price feed, explorer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkConditions {
    pub global_hashrate_ths: f64,
    pub block_reward_btc: f64,
    pub btc_price_usd: f64,
}

/// Power draw model: kW consumed per TH/s of hashrate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerModel {
    pub kw_per_th: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profitability {
    pub revenue_per_hour: f64,
    pub power_cost_per_hour: f64,
    pub profit_per_hour: f64,
    pub profit_per_day: f64,
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Expected revenue from our share of the network minus electricity cost.
pub fn profitability(
    hashrate_ths: f64,
    network: &NetworkConditions,
    power: &PowerModel,
    electricity_cents_per_kwh: f64,
) -> Profitability {
    let hashrate = non_negative(hashrate_ths);
    let global = non_negative(network.global_hashrate_ths);
    let network_share = if global > 0.0 { hashrate / global } else { 0.0 };

    let revenue_per_hour = network_share
        * non_negative(network.block_reward_btc)
        * BLOCKS_PER_HOUR
        * non_negative(network.btc_price_usd);
    let power_cost_per_hour =
        hashrate * non_negative(power.kw_per_th) * non_negative(electricity_cents_per_kwh) / 100.0;
    let profit_per_hour = revenue_per_hour - power_cost_per_hour;

    Profitability {
        revenue_per_hour,
        power_cost_per_hour,
        profit_per_hour,
        profit_per_day: profit_per_hour * 24.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_luck_band_boundaries() {
        assert_eq!(LuckBand::classify(1.2), LuckBand::VeryLucky);
        assert_eq!(LuckBand::classify(1.19), LuckBand::Lucky);
        assert_eq!(LuckBand::classify(1.05), LuckBand::Lucky);
        assert_eq!(LuckBand::classify(1.0), LuckBand::Average);
        assert_eq!(LuckBand::classify(0.95), LuckBand::Average);
        assert_eq!(LuckBand::classify(0.8), LuckBand::Unlucky);
        assert_eq!(LuckBand::classify(0.79), LuckBand::VeryUnlucky);
    }

    #[test]
    fn test_share_luck() {
        // 60 TH/s for an hour expects 360 shares
        assert!(close(share_luck(360, 60.0, 3600).unwrap(), 1.0));
        assert!(close(share_luck(720, 60.0, 3600).unwrap(), 2.0));
        assert_eq!(share_luck(10, 0.0, 3600), None);
        assert_eq!(share_luck(10, 60.0, 0), None);
        assert_eq!(share_luck(10, f64::NAN, 60), None);
    }

    #[test]
    fn test_trend_requires_minimum_points() {
        let falling: Vec<f64> = (0..23).map(|i| 100.0 - i as f64 * 4.0).collect();
        assert_eq!(performance_trend(&falling), PerformanceTrend::Stable);
    }

    #[test]
    fn test_trend_thresholds() {
        let series = |old: f64, new: f64| -> Vec<f64> {
            let mut v = vec![old; 12];
            v.extend(vec![new; 12]);
            v
        };
        assert_eq!(performance_trend(&series(100.0, 105.0)), PerformanceTrend::Improving);
        assert_eq!(performance_trend(&series(100.0, 104.0)), PerformanceTrend::Stable);
        assert_eq!(performance_trend(&series(100.0, 95.0)), PerformanceTrend::Declining);
        assert_eq!(performance_trend(&series(100.0, 81.0)), PerformanceTrend::Declining);
        assert_eq!(performance_trend(&series(100.0, 80.0)), PerformanceTrend::Critical);
        assert_eq!(performance_trend(&series(0.0, 50.0)), PerformanceTrend::Stable);
    }

    #[test]
    fn test_trend_uses_newest_points_only() {
        let mut samples = vec![1.0; 30];
        samples.extend(vec![100.0; 24]);
        assert_eq!(performance_trend(&samples), PerformanceTrend::Stable);
    }

    #[test]
    fn test_stability() {
        assert_eq!(hashrate_stability(&[10.0, 10.0, 10.0]), 100.0);
        assert_eq!(hashrate_stability(&[]), 0.0);
        assert_eq!(hashrate_stability(&[0.0, 0.0]), 0.0);
        // stddev 5, mean 10 -> cv 0.5
        assert!(close(hashrate_stability(&[5.0, 15.0]), 50.0));
        // wildly unstable clamps to zero
        assert_eq!(hashrate_stability(&[0.0, 0.0, 0.0, 100.0]), 0.0);
    }

    #[test]
    fn test_uptime_and_acceptance() {
        assert_eq!(uptime_percent(&[1.0, 0.0, 2.0, 0.0]), 50.0);
        assert_eq!(uptime_percent(&[]), 0.0);
        assert_eq!(acceptance_score(99, 1), 99.0);
        assert_eq!(acceptance_score(0, 0), 0.0);
    }

    #[test]
    fn test_health_score_weights_and_trend() {
        assert!(close(health_score(100.0, 100.0, 100.0, PerformanceTrend::Stable), 100.0));
        assert!(close(health_score(50.0, 50.0, 50.0, PerformanceTrend::Critical), 35.0));
        assert!(close(health_score(80.0, 60.0, 100.0, PerformanceTrend::Declining), 61.2));
        // Improving cannot push past 100
        assert_eq!(health_score(100.0, 100.0, 100.0, PerformanceTrend::Improving), 100.0);
    }

    #[test]
    fn test_health_score_always_clamped() {
        let inputs = [
            -1e9,
            -1.0,
            0.0,
            42.0,
            100.0,
            250.0,
            1e12,
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ];
        let trends = [
            PerformanceTrend::Improving,
            PerformanceTrend::Stable,
            PerformanceTrend::Declining,
            PerformanceTrend::Critical,
        ];
        for &s in &inputs {
            for &u in &inputs {
                for &sh in &inputs {
                    for &t in &trends {
                        let score = health_score(s, u, sh, t);
                        assert!((0.0..=100.0).contains(&score), "{} {} {} {:?}", s, u, sh, t);
                    }
                }
            }
        }
    }

    #[test]
    fn test_worker_health_from_series() {
        let mut series = BoundedSeries::new(50);
        for i in 0..30u64 {
            series.push(
                i * 60,
                PerformanceSample {
                    actual_ths: 10.0,
                    expected_ths: None,
                    ratio: None,
                },
            );
        }
        let health = worker_health("rig", &series, 100, 0);
        assert_eq!(health.stability, 100.0);
        assert_eq!(health.uptime, 100.0);
        assert_eq!(health.trend, PerformanceTrend::Stable);
        assert!(close(health.score, 100.0));

        let empty = worker_health("idle", &BoundedSeries::new(5), 0, 0);
        assert_eq!(empty.score, 0.0);
    }

    #[test]
    fn test_performance_band_boundaries() {
        assert_eq!(PerformanceBand::classify(Some(0.95)), PerformanceBand::Excellent);
        assert_eq!(PerformanceBand::classify(Some(0.9)), PerformanceBand::Good);
        assert_eq!(PerformanceBand::classify(Some(0.85)), PerformanceBand::Good);
        assert_eq!(PerformanceBand::classify(Some(0.70)), PerformanceBand::Warning);
        assert_eq!(PerformanceBand::classify(Some(0.5)), PerformanceBand::Poor);
        assert_eq!(PerformanceBand::classify(Some(0.10)), PerformanceBand::Poor);
        assert_eq!(PerformanceBand::classify(Some(0.05)), PerformanceBand::Offline);
        assert_eq!(PerformanceBand::classify(None), PerformanceBand::Unknown);
    }

    #[test]
    fn test_performance_record() {
        let record = PerformanceRecord::new("rig", 9.0, Some(10.0));
        assert!(close(record.ratio.unwrap(), 0.9));
        assert_eq!(record.band, PerformanceBand::Good);

        let no_baseline = PerformanceRecord::new("rig", 9.0, Some(0.0));
        assert_eq!(no_baseline.expected_ths, None);
        assert_eq!(no_baseline.band, PerformanceBand::Unknown);
    }

    #[test]
    fn test_profitability() {
        let network = NetworkConditions {
            global_hashrate_ths: 600_000_000.0,
            block_reward_btc: 3.125,
            btc_price_usd: 60_000.0,
        };
        let power = PowerModel { kw_per_th: 0.03 };
        let result = profitability(100.0, &network, &power, 5.0);

        assert!(close(result.revenue_per_hour, 0.1875));
        assert!(close(result.power_cost_per_hour, 0.15));
        assert!(close(result.profit_per_hour, 0.0375));
        assert!(close(result.profit_per_day, 0.9));
    }

    #[test]
    fn test_profitability_degenerate_inputs() {
        let network = NetworkConditions {
            global_hashrate_ths: 0.0,
            block_reward_btc: 3.125,
            btc_price_usd: 60_000.0,
        };
        let power = PowerModel { kw_per_th: 0.03 };
        let result = profitability(f64::NAN, &network, &power, -1.0);
        assert_eq!(result.revenue_per_hour, 0.0);
        assert_eq!(result.power_cost_per_hour, 0.0);
        assert_eq!(result.profit_per_day, 0.0);
    }
}
