use std::sync::{Arc, RwLock};

pub mod api;
pub mod config;
pub mod detector;
pub mod error;
pub mod expected;
pub mod monitor;

pub use error::{MonitorError, ValidationError};
pub use monitor::{run_monitor, Command, DashboardView, MonitorClient, MonitorSettings, MonitorState};

/// A snapshot older than this many poll intervals is stale.
pub const STALE_INTERVALS: u64 = 3;

/// Latest published dashboard view, shared with the HTTP API
pub struct ViewStorage {
    view: RwLock<Option<Arc<DashboardView>>>,
}

impl ViewStorage {
    pub fn new() -> Self {
        Self {
            view: RwLock::new(None),
        }
    }

    pub fn update(&self, view: DashboardView) {
        if let Ok(mut guard) = self.view.write() {
            *guard = Some(Arc::new(view));
        }
    }

    pub fn get(&self) -> Option<Arc<DashboardView>> {
        self.view.read().ok().and_then(|guard| guard.clone())
    }

    /// True when no snapshot has arrived within `STALE_INTERVALS` poll
    /// intervals of `now`.
    pub fn is_stale_at(&self, now: u64) -> bool {
        let view = match self.get() {
            Some(view) => view,
            None => return true,
        };
        match &view.snapshot {
            Some(snapshot) => {
                now.saturating_sub(snapshot.timestamp) > view.poll_interval_secs * STALE_INTERVALS
            }
            None => true,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(stats::unix_timestamp())
    }
}

impl Default for ViewStorage {
    fn default() -> Self {
        Self::new()
    }
}
