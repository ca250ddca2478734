//! # Notification Hooks
//!
//! Activity events produced by the monitor flow through a
//! [`NotificationDispatcher`], which always records them in the
//! [`ActivityLog`] and then, subject to [`NotificationPreferences`] and
//! deduplication, forwards them to every registered [`NotificationSink`].
//!
//! Sinks are trait objects so the in-app banner, OS notifications and test
//! doubles can be swapped without touching detection logic. Sink failures
//! are non-fatal.

use thiserror::Error;

pub mod activity;
pub mod dispatcher;
pub mod event;
pub mod preferences;

pub use activity::{ActivityLog, DEFAULT_MAX_EVENTS};
pub use dispatcher::{
    ChannelSink, Delivery, DispatchOutcome, LogSink, NotificationDispatcher, NotificationSink,
    Surface,
};
pub use event::{ActivityEvent, EventKind, Notification};
pub use preferences::NotificationPreferences;

/// Error types returned by notification sinks
#[derive(Error, Debug, Clone)]
pub enum HookError {
    /// Delivery failed with a message
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    /// Sink is not available on this host
    #[error("Notification sink not available")]
    NotAvailable,
}
