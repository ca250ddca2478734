use serde::{Deserialize, Serialize};

use crate::event::EventKind;

/// User notification toggles. A kind is shown only when both the master
/// switch and its own toggle are on; logging is never gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPreferences {
    pub smart_notifications: bool,
    pub share_found: bool,
    pub worker_online: bool,
    pub worker_offline: bool,
    pub hashrate_change: bool,
    pub milestone: bool,
    pub price_alert: bool,
    pub error: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            smart_notifications: true,
            share_found: true,
            worker_online: true,
            worker_offline: true,
            hashrate_change: true,
            milestone: true,
            price_alert: true,
            error: true,
        }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, kind: EventKind) -> bool {
        self.smart_notifications && self.kind_enabled(kind)
    }

    pub fn kind_enabled(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::ShareFound => self.share_found,
            EventKind::WorkerOnline => self.worker_online,
            EventKind::WorkerOffline => self.worker_offline,
            EventKind::HashrateChange => self.hashrate_change,
            EventKind::Milestone => self.milestone,
            EventKind::PriceAlert => self.price_alert,
            EventKind::Error => self.error,
        }
    }

    pub fn set_kind(&mut self, kind: EventKind, enabled: bool) {
        let slot = match kind {
            EventKind::ShareFound => &mut self.share_found,
            EventKind::WorkerOnline => &mut self.worker_online,
            EventKind::WorkerOffline => &mut self.worker_offline,
            EventKind::HashrateChange => &mut self.hashrate_change,
            EventKind::Milestone => &mut self.milestone,
            EventKind::PriceAlert => &mut self.price_alert,
            EventKind::Error => &mut self.error,
        };
        *slot = enabled;
    }
}
