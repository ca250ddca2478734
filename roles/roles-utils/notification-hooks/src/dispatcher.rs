//! Routing of activity events to the log and to notification sinks.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::activity::ActivityLog;
use crate::event::{ActivityEvent, EventKind, Notification};
use crate::preferences::NotificationPreferences;
use crate::HookError;

/// Where a notification is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    /// Transient in-app banner
    Banner,
    /// OS-level notification
    System,
}

/// Receiver of user-visible notifications.
///
/// Failures are reported back to the dispatcher, which logs them and carries
/// on with the remaining sinks. A failing sink never affects the activity log.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn show_banner(&self, notification: &Notification) -> Result<(), HookError>;

    async fn send_system(&self, notification: &Notification) -> Result<(), HookError>;
}

/// Writes notifications to the tracing log.
pub struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn show_banner(&self, notification: &Notification) -> Result<(), HookError> {
        info!("[{}] {}: {}", notification.kind, notification.title, notification.body);
        Ok(())
    }

    async fn send_system(&self, notification: &Notification) -> Result<(), HookError> {
        info!(
            "System notification [{}] {}: {}",
            notification.kind, notification.title, notification.body
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Delivery {
    pub surface: Surface,
    pub notification: Notification,
}

/// Broadcasts notifications to any number of in-process subscribers.
pub struct ChannelSink {
    sender: broadcast::Sender<Delivery>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Delivery> {
        self.sender.subscribe()
    }

    fn deliver(&self, surface: Surface, notification: &Notification) {
        let delivery = Delivery {
            surface,
            notification: notification.clone(),
        };
        // No subscribers is not an error
        if self.sender.send(delivery).is_err() {
            debug!("No subscribers for {:?} notification", surface);
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for ChannelSink {
    async fn show_banner(&self, notification: &Notification) -> Result<(), HookError> {
        self.deliver(Surface::Banner, notification);
        Ok(())
    }

    async fn send_system(&self, notification: &Notification) -> Result<(), HookError> {
        self.deliver(Surface::System, notification);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Recorded in the activity log only (preferences disallow the kind)
    Logged,
    /// Recorded and shown
    Notified,
    /// Recorded, but an identical notification was already shown this minute
    Suppressed,
}

/// Owns the activity log and the set of sinks.
pub struct NotificationDispatcher {
    log: ActivityLog,
    preferences: NotificationPreferences,
    system_notifications: bool,
    sinks: Vec<Arc<dyn NotificationSink>>,
    shown_bucket: u64,
    shown: HashSet<(EventKind, String)>,
}

impl NotificationDispatcher {
    pub fn new(log: ActivityLog, preferences: NotificationPreferences) -> Self {
        Self {
            log,
            preferences,
            system_notifications: true,
            sinks: Vec::new(),
            shown_bucket: 0,
            shown: HashSet::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_system_notifications(mut self, enabled: bool) -> Self {
        self.system_notifications = enabled;
        self
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut ActivityLog {
        &mut self.log
    }

    pub fn preferences(&self) -> &NotificationPreferences {
        &self.preferences
    }

    pub fn set_preferences(&mut self, preferences: NotificationPreferences) {
        self.preferences = preferences;
    }

    /// True if this (kind, message) was already shown in the event's minute.
    /// Otherwise records it as shown.
    fn is_duplicate(&mut self, event: &ActivityEvent) -> bool {
        let bucket = event.timestamp / 60;
        if bucket != self.shown_bucket {
            self.shown_bucket = bucket;
            self.shown.clear();
        }
        !self.shown.insert((event.kind, event.message.clone()))
    }

    /// Log the event, then surface it if preferences allow and it is not a
    /// repeat. Sink failures are logged and otherwise ignored.
    pub async fn dispatch(&mut self, event: ActivityEvent) -> DispatchOutcome {
        let notification = event.notification();
        let allowed = self.preferences.allows(event.kind);
        let duplicate = allowed && self.is_duplicate(&event);
        self.log.push(event);

        if !allowed {
            return DispatchOutcome::Logged;
        }
        if duplicate {
            debug!("Suppressing repeated {} notification", notification.kind);
            return DispatchOutcome::Suppressed;
        }

        for sink in &self.sinks {
            if let Err(e) = sink.show_banner(&notification).await {
                warn!("Banner notification failed: {}", e);
            }
            if self.system_notifications {
                if let Err(e) = sink.send_system(&notification).await {
                    warn!("System notification failed: {}", e);
                }
            }
        }

        DispatchOutcome::Notified
    }
}
