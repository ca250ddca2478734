use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Category of an activity event. Each kind has its own preference toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ShareFound,
    WorkerOnline,
    WorkerOffline,
    HashrateChange,
    Milestone,
    PriceAlert,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::ShareFound,
        EventKind::WorkerOnline,
        EventKind::WorkerOffline,
        EventKind::HashrateChange,
        EventKind::Milestone,
        EventKind::PriceAlert,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ShareFound => "share_found",
            EventKind::WorkerOnline => "worker_online",
            EventKind::WorkerOffline => "worker_offline",
            EventKind::HashrateChange => "hashrate_change",
            EventKind::Milestone => "milestone",
            EventKind::PriceAlert => "price_alert",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Assigned by the activity log on append
    pub id: u64,

    /// Unix timestamp of the snapshot or failure that produced the event
    pub timestamp: u64,

    pub kind: EventKind,

    pub title: String,

    pub message: String,

    #[serde(default)]
    pub payload: Value,

    #[serde(default)]
    pub read: bool,
}

impl ActivityEvent {
    pub fn new(
        kind: EventKind,
        title: impl Into<String>,
        message: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            id: 0,
            timestamp,
            kind,
            title: title.into(),
            message: message.into(),
            payload: Value::Null,
            read: false,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn notification(&self) -> Notification {
        Notification {
            kind: self.kind,
            title: self.title.clone(),
            body: self.message.clone(),
        }
    }
}

/// What a sink actually shows: a title and a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: EventKind,
    pub title: String,
    pub body: String,
}
