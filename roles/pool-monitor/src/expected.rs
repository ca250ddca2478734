//! Per-worker baselines and worker URLs, both keyed by cleaned worker name.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use stats::extract::clean_worker_name;
use stats_history::{BoundedSeries, PerformanceSample};
use std::collections::BTreeMap;

use crate::error::ValidationError;

/// Performance samples needed before a baseline is auto-detected.
pub const AUTO_DETECT_MIN_SAMPLES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedHashrate {
    pub ths: f64,
    pub auto_detected: bool,
}

fn worker_key(worker: &str) -> Result<String, ValidationError> {
    let key = clean_worker_name(worker);
    if key.is_empty() {
        return Err(ValidationError::EmptyWorkerName);
    }
    Ok(key)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedHashrates {
    entries: BTreeMap<String, ExpectedHashrate>,
}

impl ExpectedHashrates {
    /// Record a user-entered baseline. Manual values are never replaced by
    /// auto-detection.
    pub fn set_manual(&mut self, worker: &str, ths: f64) -> Result<(), ValidationError> {
        if !ths.is_finite() || ths <= 0.0 {
            return Err(ValidationError::InvalidHashrate(ths));
        }
        let key = worker_key(worker)?;
        self.entries.insert(
            key,
            ExpectedHashrate {
                ths,
                auto_detected: false,
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, worker: &str) -> Option<ExpectedHashrate> {
        self.entries.remove(&clean_worker_name(worker))
    }

    pub fn get(&self, worker: &str) -> Option<&ExpectedHashrate> {
        self.entries.get(&clean_worker_name(worker))
    }

    pub fn expected_ths(&self, worker: &str) -> Option<f64> {
        self.get(worker).map(|e| e.ths)
    }

    /// Derive a baseline from the peak observed hashrate once enough samples
    /// exist. Returns the new value when the registry changed.
    pub fn auto_detect(
        &mut self,
        worker: &str,
        series: &BoundedSeries<PerformanceSample>,
    ) -> Option<f64> {
        if series.len() < AUTO_DETECT_MIN_SAMPLES {
            return None;
        }
        if matches!(self.get(worker), Some(e) if !e.auto_detected) {
            return None;
        }

        let peak = series
            .iter()
            .map(|p| p.value.actual_ths)
            .filter(|v| v.is_finite())
            .fold(0.0_f64, f64::max);
        if peak <= 0.0 {
            return None;
        }

        let key = worker_key(worker).ok()?;
        match self.entries.get(&key) {
            Some(existing) if existing.ths == peak => None,
            _ => {
                self.entries.insert(
                    key,
                    ExpectedHashrate {
                        ths: peak,
                        auto_detected: true,
                    },
                );
                Some(peak)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExpectedHashrate)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Links from a worker to its own management page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerUrls {
    entries: BTreeMap<String, String>,
}

impl WorkerUrls {
    /// Only absolute http(s) URLs are accepted.
    pub fn set(&mut self, worker: &str, url: &str) -> Result<(), ValidationError> {
        let key = worker_key(worker)?;
        let invalid = |reason: String| ValidationError::InvalidUrl {
            worker: key.clone(),
            reason,
        };

        let parsed = Url::parse(url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", parsed.scheme())));
        }

        self.entries.insert(key, parsed.to_string());
        Ok(())
    }

    pub fn remove(&mut self, worker: &str) -> Option<String> {
        self.entries.remove(&clean_worker_name(worker))
    }

    pub fn get(&self, worker: &str) -> Option<&str> {
        self.entries.get(&clean_worker_name(worker)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
