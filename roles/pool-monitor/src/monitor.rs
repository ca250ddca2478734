//! The composed monitor state and the task that owns it.
//!
//! `MonitorState` is the single owner of every snapshot, series, baseline
//! and the activity log. It lives inside one task (`run_monitor`); the
//! poller and the HTTP API talk to it through channels, and read access goes
//! through the published `DashboardView`.

use notification_hooks::{
    ActivityEvent, ActivityLog, EventKind, NotificationDispatcher, NotificationPreferences,
    NotificationSink,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use stats::{unix_timestamp, FetchError, HashrateWindows, PollOutcome, PollerHandle, PoolSnapshot};
use stats_history::{
    analytics, keys, load_json, save_json, BoundedSeries, EconomicSample, HealthSample,
    HistoryPoint, HistoryStore, LuckBand, NetworkConditions, PerformanceRecord, PerformanceTrend,
    PowerModel, Profitability, ShareSample, StateStore, WorkerHealth,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use web_utils::{format_elapsed_time, format_hashrate_ths};

use crate::{
    config::{validate_poll_interval, Config},
    detector::{detect_changes, DetectedChange, PriceTier},
    error::{MonitorError, ValidationError},
    expected::{ExpectedHashrate, ExpectedHashrates, WorkerUrls},
    ViewStorage,
};

/// Runtime settings derived from the configuration.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub history_capacity: usize,
    pub luck_window_secs: u64,
    pub max_events: usize,
    pub system_notifications: bool,
    pub network: NetworkConditions,
    pub power: PowerModel,
    pub default_electricity_cents: f64,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            history_capacity: config.history.capacity,
            luck_window_secs: config.history.luck_window_secs,
            max_events: config.activity.max_events,
            system_notifications: config.notifications.system_notifications,
            network: config.network_conditions(),
            power: config.power_model(),
            default_electricity_cents: config.power.default_electricity_cents,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerView {
    pub name: String,
    pub raw_name: String,
    pub online: bool,
    pub hashrate: HashrateWindows,
    pub accepted_shares: u64,
    pub rejected_shares: u64,
    pub best_share: f64,
    pub last_share_time: Option<String>,
    pub last_share_age: Option<String>,
    pub performance: PerformanceRecord,
    pub health: WorkerHealth,
    pub expected: Option<ExpectedHashrate>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsView {
    pub luck: Option<f64>,
    pub luck_band: Option<LuckBand>,
    pub hashrate_stability: f64,
    pub hashrate_trend: PerformanceTrend,
    pub average_health: Option<f64>,
    pub electricity_cents: Option<f64>,
    pub price_tier: Option<PriceTier>,
    pub profitability: Option<Profitability>,
}

/// Read-only copy of everything the API serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardView {
    pub generated_at: u64,
    pub poll_interval_secs: u64,
    pub snapshot: Option<PoolSnapshot>,
    pub last_error: Option<String>,
    pub workers: Vec<WorkerView>,
    pub analytics: AnalyticsView,
    /// Newest first
    pub activity: Vec<ActivityEvent>,
    pub unread_count: usize,
    pub preferences: NotificationPreferences,
    pub history: HistoryStore,
}

/// User actions forwarded from the API. Each carries its reply channel.
#[derive(Debug)]
pub enum Command {
    SetExpectedHashrate {
        worker: String,
        ths: f64,
        reply: oneshot::Sender<Result<(), ValidationError>>,
    },
    RemoveExpectedHashrate {
        worker: String,
        reply: oneshot::Sender<bool>,
    },
    SetWorkerUrl {
        worker: String,
        url: String,
        reply: oneshot::Sender<Result<(), ValidationError>>,
    },
    RemoveWorkerUrl {
        worker: String,
        reply: oneshot::Sender<bool>,
    },
    SetPreferences {
        preferences: NotificationPreferences,
        reply: oneshot::Sender<()>,
    },
    /// `None` marks every event read
    MarkRead {
        id: Option<u64>,
        reply: oneshot::Sender<Result<usize, ValidationError>>,
    },
    SetPollInterval {
        secs: u64,
        reply: oneshot::Sender<Result<(), ValidationError>>,
    },
}

async fn restore<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Option<T> {
    match load_json(store, key).await {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to load persisted {}: {}", key, e);
            None
        }
    }
}

pub struct MonitorState {
    settings: MonitorSettings,
    store: Arc<dyn StateStore>,
    current: Option<PoolSnapshot>,
    previous: Option<PoolSnapshot>,
    history: HistoryStore,
    expected: ExpectedHashrates,
    worker_urls: WorkerUrls,
    dispatcher: NotificationDispatcher,
    last_error: Option<String>,
}

impl MonitorState {
    /// Build the state from settings plus whatever was persisted. Unreadable
    /// entries are logged and replaced with defaults.
    pub async fn load(
        mut settings: MonitorSettings,
        store: Arc<dyn StateStore>,
        sinks: Vec<Arc<dyn NotificationSink>>,
    ) -> Self {
        let preferences: NotificationPreferences = restore(store.as_ref(), keys::PREFERENCES)
            .await
            .unwrap_or_default();

        let mut log: ActivityLog = restore(store.as_ref(), keys::ACTIVITY_LOG)
            .await
            .unwrap_or_else(|| ActivityLog::new(settings.max_events));
        log.set_max_events(settings.max_events);

        let mut history: HistoryStore = restore(store.as_ref(), keys::HISTORY)
            .await
            .unwrap_or_else(|| HistoryStore::new(settings.history_capacity));
        history.set_capacity(settings.history_capacity);

        let expected: ExpectedHashrates = restore(store.as_ref(), keys::EXPECTED_HASHRATES)
            .await
            .unwrap_or_default();
        let worker_urls: WorkerUrls = restore(store.as_ref(), keys::WORKER_URLS)
            .await
            .unwrap_or_default();

        if let Some(secs) = restore::<u64>(store.as_ref(), keys::POLL_INTERVAL).await {
            match validate_poll_interval(secs) {
                Ok(()) => settings.poll_interval = Duration::from_secs(secs),
                Err(e) => warn!("Ignoring persisted poll interval: {}", e),
            }
        }

        let mut dispatcher = NotificationDispatcher::new(log, preferences)
            .with_system_notifications(settings.system_notifications);
        for sink in sinks {
            dispatcher = dispatcher.with_sink(sink);
        }

        info!(
            "Restored {} history points, {} activity events, {} baselines",
            history.hashrate.len(),
            dispatcher.log().len(),
            expected.len()
        );

        Self {
            settings,
            store,
            current: None,
            previous: None,
            history,
            expected,
            worker_urls,
            dispatcher,
            last_error: None,
        }
    }

    async fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = save_json(self.store.as_ref(), key, value).await {
            warn!("Failed to persist {}: {}", key, e);
        }
    }

    /// Accept a new snapshot: swap it in as current, record history, run
    /// detection against the snapshot it replaced and dispatch the results.
    pub async fn apply_snapshot(&mut self, snapshot: PoolSnapshot) -> Vec<DetectedChange> {
        let timestamp = snapshot.timestamp;
        let changes = detect_changes(self.current.as_ref(), &snapshot);
        self.previous = self.current.replace(snapshot);
        self.last_error = None;

        let baselines_changed = self.record_history();

        for change in &changes {
            self.dispatcher
                .dispatch(change.clone().into_event(timestamp))
                .await;
        }
        debug!("Applied snapshot at {} ({} changes)", timestamp, changes.len());

        self.persist(keys::HISTORY, &self.history).await;
        self.persist(keys::ACTIVITY_LOG, self.dispatcher.log()).await;
        if baselines_changed {
            self.persist(keys::EXPECTED_HASHRATES, &self.expected).await;
        }

        changes
    }

    /// Append the current snapshot to every series. Returns true when an
    /// auto-detected baseline changed.
    fn record_history(&mut self) -> bool {
        let current = match &self.current {
            Some(current) => current,
            None => return false,
        };
        let ts = current.timestamp;

        self.history.hashrate.push(ts, current.hashrate.m1);

        let delta = match &self.previous {
            Some(previous) => current
                .accepted_shares
                .saturating_sub(previous.accepted_shares),
            None => 0,
        };
        let mut window = self
            .history
            .share_analytics
            .query(self.settings.luck_window_secs, ts);
        let luck = window.next().and_then(|first| {
            let observed: u64 = window.map(|p| p.value.shares_delta).sum::<u64>() + delta;
            analytics::share_luck(
                observed,
                current.hashrate.h1,
                ts.saturating_sub(first.timestamp),
            )
        });
        self.history.share_analytics.push(
            ts,
            ShareSample {
                accepted_shares: current.accepted_shares,
                rejected_shares: current.total_rejected_shares(),
                shares_delta: delta,
                luck,
            },
        );

        let mut baselines_changed = false;
        let mut scores = Vec::with_capacity(current.workers.len());
        for worker in &current.workers {
            let record = PerformanceRecord::new(
                &worker.name,
                worker.hashrate.h1,
                self.expected.expected_ths(&worker.name),
            );
            self.history.append_performance(
                &worker.name,
                HistoryPoint {
                    timestamp: ts,
                    value: record.sample(),
                },
            );

            if let Some(series) = self.history.performance(&worker.name) {
                if let Some(ths) = self.expected.auto_detect(&worker.name, series) {
                    info!(
                        "Auto-detected expected hashrate for {}: {}",
                        worker.name,
                        format_hashrate_ths(ths)
                    );
                    baselines_changed = true;
                }
                scores.push(
                    analytics::worker_health(
                        &worker.name,
                        series,
                        worker.accepted_shares,
                        worker.rejected_shares,
                    )
                    .score,
                );
            }
        }

        // Workers missing from the snapshot count as down until the health
        // window is saturated with idle samples
        let present = current.worker_ids();
        let absent: Vec<String> = self
            .history
            .performance_workers()
            .filter(|worker| !present.contains(worker))
            .map(str::to_string)
            .collect();
        for worker in absent {
            let saturated = self.history.performance(&worker).map_or(true, |series| {
                let idle = series
                    .iter()
                    .rev()
                    .take_while(|p| p.value.actual_ths <= 0.0)
                    .count();
                idle >= series.capacity().min(analytics::HEALTH_SAMPLE_WINDOW)
            });
            if saturated {
                continue;
            }
            let record = PerformanceRecord::new(&worker, 0.0, self.expected.expected_ths(&worker));
            self.history.append_performance(
                &worker,
                HistoryPoint {
                    timestamp: ts,
                    value: record.sample(),
                },
            );
        }

        let horizon = self.settings.poll_interval.as_secs() * self.settings.history_capacity as u64;
        for worker in self.history.prune_performance(ts.saturating_sub(horizon)) {
            debug!("Dropped performance history of departed worker {}", worker);
        }

        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        self.history.worker_health.push(
            ts,
            HealthSample {
                average_score,
                online_workers: current.workers.iter().filter(|w| w.is_hashing()).count() as u32,
                total_workers: current.workers.len() as u32,
            },
        );

        let electricity = current
            .current_price()
            .unwrap_or(self.settings.default_electricity_cents);
        let estimate = analytics::profitability(
            current.hashrate.h1,
            &self.settings.network,
            &self.settings.power,
            electricity,
        );
        self.history.economic.push(
            ts,
            EconomicSample {
                revenue_per_hour: estimate.revenue_per_hour,
                power_cost_per_hour: estimate.power_cost_per_hour,
                profit_per_hour: estimate.profit_per_hour,
                electricity_cents: electricity,
            },
        );

        baselines_changed
    }

    /// A failed fetch leaves every snapshot and series untouched; it only
    /// produces an error event.
    pub async fn record_failure(&mut self, error: &FetchError, now: u64) {
        self.last_error = Some(error.to_string());
        let event = ActivityEvent::new(
            EventKind::Error,
            "Failed to fetch pool stats",
            error.to_string(),
            now,
        );
        self.dispatcher.dispatch(event).await;
        self.persist(keys::ACTIVITY_LOG, self.dispatcher.log()).await;
    }

    pub async fn set_expected_hashrate(
        &mut self,
        worker: &str,
        ths: f64,
    ) -> Result<(), ValidationError> {
        self.expected.set_manual(worker, ths)?;
        info!("Expected hashrate for {} set to {}", worker, format_hashrate_ths(ths));
        self.persist(keys::EXPECTED_HASHRATES, &self.expected).await;
        Ok(())
    }

    pub async fn remove_expected_hashrate(&mut self, worker: &str) -> bool {
        let removed = self.expected.remove(worker).is_some();
        if removed {
            self.persist(keys::EXPECTED_HASHRATES, &self.expected).await;
        }
        removed
    }

    pub async fn set_worker_url(&mut self, worker: &str, url: &str) -> Result<(), ValidationError> {
        self.worker_urls.set(worker, url)?;
        self.persist(keys::WORKER_URLS, &self.worker_urls).await;
        Ok(())
    }

    pub async fn remove_worker_url(&mut self, worker: &str) -> bool {
        let removed = self.worker_urls.remove(worker).is_some();
        if removed {
            self.persist(keys::WORKER_URLS, &self.worker_urls).await;
        }
        removed
    }

    pub async fn set_preferences(&mut self, preferences: NotificationPreferences) {
        self.dispatcher.set_preferences(preferences);
        self.persist(keys::PREFERENCES, self.dispatcher.preferences())
            .await;
    }

    pub async fn mark_read(&mut self, id: Option<u64>) -> Result<usize, ValidationError> {
        let marked = match id {
            Some(id) => {
                if !self.dispatcher.log_mut().mark_read(id) {
                    return Err(ValidationError::UnknownEvent(id));
                }
                1
            }
            None => self.dispatcher.log_mut().mark_all_read(),
        };
        self.persist(keys::ACTIVITY_LOG, self.dispatcher.log()).await;
        Ok(marked)
    }

    pub async fn set_poll_interval(&mut self, secs: u64) -> Result<Duration, ValidationError> {
        validate_poll_interval(secs)?;
        self.settings.poll_interval = Duration::from_secs(secs);
        self.persist(keys::POLL_INTERVAL, &secs).await;
        Ok(self.settings.poll_interval)
    }

    pub async fn handle_command(&mut self, command: Command, poller: Option<&PollerHandle>) {
        // A dropped reply receiver only means the requester went away
        match command {
            Command::SetExpectedHashrate { worker, ths, reply } => {
                let _ = reply.send(self.set_expected_hashrate(&worker, ths).await);
            }
            Command::RemoveExpectedHashrate { worker, reply } => {
                let _ = reply.send(self.remove_expected_hashrate(&worker).await);
            }
            Command::SetWorkerUrl { worker, url, reply } => {
                let _ = reply.send(self.set_worker_url(&worker, &url).await);
            }
            Command::RemoveWorkerUrl { worker, reply } => {
                let _ = reply.send(self.remove_worker_url(&worker).await);
            }
            Command::SetPreferences { preferences, reply } => {
                self.set_preferences(preferences).await;
                let _ = reply.send(());
            }
            Command::MarkRead { id, reply } => {
                let _ = reply.send(self.mark_read(id).await);
            }
            Command::SetPollInterval { secs, reply } => {
                let result = self.set_poll_interval(secs).await.map(|interval| {
                    if let Some(poller) = poller {
                        poller.set_interval(interval);
                    }
                });
                let _ = reply.send(result);
            }
        }
    }

    /// Write every persisted key, reporting the first failure.
    pub async fn flush(&self) -> Result<(), MonitorError> {
        let store = self.store.as_ref();
        save_json(store, keys::PREFERENCES, self.dispatcher.preferences()).await?;
        save_json(store, keys::EXPECTED_HASHRATES, &self.expected).await?;
        save_json(store, keys::WORKER_URLS, &self.worker_urls).await?;
        save_json(store, keys::ACTIVITY_LOG, self.dispatcher.log()).await?;
        save_json(store, keys::HISTORY, &self.history).await?;
        save_json(store, keys::POLL_INTERVAL, &self.settings.poll_interval.as_secs()).await?;
        Ok(())
    }

    pub fn current(&self) -> Option<&PoolSnapshot> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&PoolSnapshot> {
        self.previous.as_ref()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn activity(&self) -> &ActivityLog {
        self.dispatcher.log()
    }

    pub fn preferences(&self) -> &NotificationPreferences {
        self.dispatcher.preferences()
    }

    pub fn expected(&self) -> &ExpectedHashrates {
        &self.expected
    }

    pub fn worker_urls(&self) -> &WorkerUrls {
        &self.worker_urls
    }

    pub fn poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn worker_views(&self, now: u64) -> Vec<WorkerView> {
        let current = match &self.current {
            Some(current) => current,
            None => return Vec::new(),
        };
        let empty = BoundedSeries::new(1);

        current
            .workers
            .iter()
            .map(|worker| {
                let series = self.history.performance(&worker.name).unwrap_or(&empty);
                WorkerView {
                    name: worker.name.clone(),
                    raw_name: worker.raw_name.clone(),
                    online: worker.is_hashing(),
                    hashrate: worker.hashrate,
                    accepted_shares: worker.accepted_shares,
                    rejected_shares: worker.rejected_shares,
                    best_share: worker.best_share,
                    last_share_time: worker.last_share_time.map(|t| t.to_rfc3339()),
                    last_share_age: worker
                        .last_share_time
                        .map(|t| format_elapsed_time(now, t.timestamp().max(0) as u64)),
                    performance: PerformanceRecord::new(
                        &worker.name,
                        worker.hashrate.h1,
                        self.expected.expected_ths(&worker.name),
                    ),
                    health: analytics::worker_health(
                        &worker.name,
                        series,
                        worker.accepted_shares,
                        worker.rejected_shares,
                    ),
                    expected: self.expected.get(&worker.name).copied(),
                    url: self.worker_urls.get(&worker.name).map(str::to_string),
                }
            })
            .collect()
    }

    fn analytics_view(&self) -> AnalyticsView {
        let luck = self
            .history
            .share_analytics
            .latest()
            .and_then(|p| p.value.luck);
        let recent_hashrate = self
            .history
            .hashrate
            .recent_values(analytics::HEALTH_SAMPLE_WINDOW);
        let all_hashrate: Vec<f64> = self.history.hashrate.iter().map(|p| p.value).collect();
        let electricity = self.current.as_ref().and_then(PoolSnapshot::current_price);

        AnalyticsView {
            luck,
            luck_band: luck.map(LuckBand::classify),
            hashrate_stability: analytics::hashrate_stability(&recent_hashrate),
            hashrate_trend: analytics::performance_trend(&all_hashrate),
            average_health: self
                .history
                .worker_health
                .latest()
                .filter(|p| p.value.total_workers > 0)
                .map(|p| p.value.average_score),
            electricity_cents: electricity,
            price_tier: electricity.map(PriceTier::from_cents),
            profitability: self.current.as_ref().map(|current| {
                analytics::profitability(
                    current.hashrate.h1,
                    &self.settings.network,
                    &self.settings.power,
                    electricity.unwrap_or(self.settings.default_electricity_cents),
                )
            }),
        }
    }

    pub fn view(&self, now: u64) -> DashboardView {
        let log = self.dispatcher.log();
        DashboardView {
            generated_at: now,
            poll_interval_secs: self.settings.poll_interval.as_secs(),
            snapshot: self.current.clone(),
            last_error: self.last_error.clone(),
            workers: self.worker_views(now),
            analytics: self.analytics_view(),
            activity: log.recent(log.len()).into_iter().cloned().collect(),
            unread_count: log.unread_count(),
            preferences: *self.dispatcher.preferences(),
            history: self.history.clone(),
        }
    }
}

/// Cloneable handle the API uses to send commands to the monitor task.
#[derive(Debug, Clone)]
pub struct MonitorClient {
    commands: mpsc::Sender<Command>,
}

impl MonitorClient {
    pub fn new(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, MonitorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| MonitorError::Unavailable)?;
        rx.await.map_err(|_| MonitorError::Unavailable)
    }

    pub async fn set_expected_hashrate(&self, worker: String, ths: f64) -> Result<(), MonitorError> {
        Ok(self
            .request(|reply| Command::SetExpectedHashrate { worker, ths, reply })
            .await??)
    }

    pub async fn remove_expected_hashrate(&self, worker: String) -> Result<bool, MonitorError> {
        self.request(|reply| Command::RemoveExpectedHashrate { worker, reply })
            .await
    }

    pub async fn set_worker_url(&self, worker: String, url: String) -> Result<(), MonitorError> {
        Ok(self
            .request(|reply| Command::SetWorkerUrl { worker, url, reply })
            .await??)
    }

    pub async fn remove_worker_url(&self, worker: String) -> Result<bool, MonitorError> {
        self.request(|reply| Command::RemoveWorkerUrl { worker, reply })
            .await
    }

    pub async fn set_preferences(
        &self,
        preferences: NotificationPreferences,
    ) -> Result<(), MonitorError> {
        self.request(|reply| Command::SetPreferences { preferences, reply })
            .await
    }

    pub async fn mark_read(&self, id: Option<u64>) -> Result<usize, MonitorError> {
        Ok(self.request(|reply| Command::MarkRead { id, reply }).await??)
    }

    pub async fn set_poll_interval(&self, secs: u64) -> Result<(), MonitorError> {
        Ok(self
            .request(|reply| Command::SetPollInterval { secs, reply })
            .await??)
    }
}

/// Own the state until the poller goes away, applying poll outcomes and
/// user commands in arrival order and republishing the view after each.
pub async fn run_monitor(
    mut state: MonitorState,
    mut outcomes: mpsc::Receiver<PollOutcome>,
    mut commands: mpsc::Receiver<Command>,
    poller: Option<PollerHandle>,
    view: Arc<ViewStorage>,
) -> MonitorState {
    view.update(state.view(unix_timestamp()));
    let mut commands_open = true;

    loop {
        tokio::select! {
            outcome = outcomes.recv() => match outcome {
                Some(PollOutcome::Snapshot(snapshot)) => {
                    state.apply_snapshot(snapshot).await;
                }
                Some(PollOutcome::Failed(error)) => {
                    state.record_failure(&error, unix_timestamp()).await;
                }
                None => {
                    info!("Poller finished, stopping monitor");
                    break;
                }
            },
            command = commands.recv(), if commands_open => match command {
                Some(command) => state.handle_command(command, poller.as_ref()).await,
                None => {
                    debug!("Command channel closed");
                    commands_open = false;
                    continue;
                }
            },
        }
        view.update(state.view(unix_timestamp()));
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use notification_hooks::{HookError, Notification};
    use serde_json::json;
    use stats_history::{MemoryStateStore, StorageError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingStore;

    #[async_trait::async_trait]
    impl StateStore for FailingStore {
        async fn get_raw(&self, _key: &str) -> stats_history::storage::Result<Option<String>> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk gone",
            )))
        }

        async fn put_raw(&self, _key: &str, _value: String) -> stats_history::storage::Result<()> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk gone",
            )))
        }

        async fn remove(&self, _key: &str) -> stats_history::storage::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingSink {
        banners: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl NotificationSink for CountingSink {
        async fn show_banner(&self, _notification: &Notification) -> Result<(), HookError> {
            self.banners.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send_system(&self, _notification: &Notification) -> Result<(), HookError> {
            Ok(())
        }
    }

    fn snapshot(ts: u64, accepted: u64, m1: f64, workers: &[&str]) -> PoolSnapshot {
        let workers: Vec<_> = workers
            .iter()
            .map(|w| {
                json!({
                    "workername": format!("bc1qaddr.{}", w),
                    "hashrate1m": "10T",
                    "hashrate1hr": "10T",
                    "shares": 10,
                })
            })
            .collect();
        PoolSnapshot::from_json(
            &json!({
                "worker_count": workers.len(),
                "accepted_shares": accepted,
                "hashrate_1min_ths": m1,
                "hashrate_1hr_ths": m1,
                "workers": workers,
            }),
            ts,
        )
    }

    async fn memory_state() -> (MonitorState, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        let state = MonitorState::load(MonitorSettings::default(), store.clone(), Vec::new()).await;
        (state, store)
    }

    #[tokio::test]
    async fn test_apply_snapshot_swaps_current_and_previous() {
        let (mut state, _) = memory_state().await;

        state.apply_snapshot(snapshot(100, 10, 40.0, &["w1"])).await;
        assert!(state.previous().is_none());
        assert_eq!(state.current().unwrap().timestamp, 100);

        state.apply_snapshot(snapshot(200, 12, 40.0, &["w1"])).await;
        assert_eq!(state.previous().unwrap().timestamp, 100);
        assert_eq!(state.current().unwrap().timestamp, 200);
    }

    #[tokio::test]
    async fn test_apply_snapshot_records_every_series() {
        let (mut state, _) = memory_state().await;
        state.apply_snapshot(snapshot(100, 10, 40.0, &["w1", "w2"])).await;
        state.apply_snapshot(snapshot(160, 15, 40.0, &["w1", "w2"])).await;

        let history = state.history();
        assert_eq!(history.hashrate.len(), 2);
        assert_eq!(history.share_analytics.len(), 2);
        assert_eq!(history.worker_health.len(), 2);
        assert_eq!(history.economic.len(), 2);
        assert_eq!(history.performance("w1").unwrap().len(), 2);

        let shares = history.share_analytics.latest().unwrap().value;
        assert_eq!(shares.shares_delta, 5);
        // 5 shares over 60s at 40 TH/s against 4 expected
        assert!((shares.luck.unwrap() - 1.25).abs() < 1e-9);

        let health = history.worker_health.latest().unwrap().value;
        assert_eq!(health.total_workers, 2);
        assert_eq!(health.online_workers, 2);
    }

    #[tokio::test]
    async fn test_first_snapshot_logs_started_event() {
        let (mut state, store) = memory_state().await;
        let changes = state.apply_snapshot(snapshot(100, 0, 5.0, &["w1"])).await;

        assert!(matches!(changes[..], [DetectedChange::Started { .. }]));
        assert_eq!(state.activity().len(), 1);
        assert!(store.get_raw(keys::HISTORY).await.unwrap().is_some());
        assert!(store.get_raw(keys::ACTIVITY_LOG).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failure_leaves_snapshot_untouched() {
        let (mut state, _) = memory_state().await;
        state.apply_snapshot(snapshot(100, 10, 40.0, &["w1"])).await;
        let before = state.current().cloned();
        let points = state.history().hashrate.len();

        state.record_failure(&FetchError::Status(503), 150).await;

        assert_eq!(state.current().cloned(), before);
        assert_eq!(state.history().hashrate.len(), points);
        assert_eq!(state.last_error(), Some("Endpoint returned HTTP 503"));
        let latest = state.activity().recent(1)[0];
        assert_eq!(latest.kind, EventKind::Error);

        // a later success clears the error
        state.apply_snapshot(snapshot(200, 10, 40.0, &["w1"])).await;
        assert!(state.last_error().is_none());
    }

    #[tokio::test]
    async fn test_preferences_gate_notifications_not_logging() {
        let sink = Arc::new(CountingSink::default());
        let store = Arc::new(MemoryStateStore::new());
        let mut state =
            MonitorState::load(
                MonitorSettings::default(),
                store.clone(),
                vec![sink.clone() as Arc<dyn NotificationSink>],
            )
            .await;

        state
            .set_preferences(NotificationPreferences {
                smart_notifications: false,
                ..Default::default()
            })
            .await;
        state.apply_snapshot(snapshot(100, 0, 5.0, &["w1"])).await;
        state.apply_snapshot(snapshot(200, 3, 5.0, &["w1"])).await;

        assert_eq!(sink.banners.load(Ordering::SeqCst), 0);
        assert_eq!(state.activity().len(), 2);
        assert!(store.get_raw(keys::PREFERENCES).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expected_hashrate_actions_validate_and_persist() {
        let (mut state, store) = memory_state().await;

        assert_eq!(
            state.set_expected_hashrate("rig", -1.0).await,
            Err(ValidationError::InvalidHashrate(-1.0))
        );
        assert!(store.get_raw(keys::EXPECTED_HASHRATES).await.unwrap().is_none());

        state.set_expected_hashrate("addr.rig", 12.0).await.unwrap();
        let saved: ExpectedHashrates = load_json(store.as_ref(), keys::EXPECTED_HASHRATES)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.expected_ths("rig"), Some(12.0));

        assert!(state.remove_expected_hashrate("rig").await);
        assert!(!state.remove_expected_hashrate("rig").await);
    }

    #[tokio::test]
    async fn test_performance_uses_baseline() {
        let (mut state, _) = memory_state().await;
        state.set_expected_hashrate("w1", 20.0).await.unwrap();
        state.apply_snapshot(snapshot(100, 0, 5.0, &["w1"])).await;

        let view = state.view(100);
        let worker = &view.workers[0];
        assert_eq!(worker.performance.ratio, Some(0.5));
        assert_eq!(worker.performance.band, stats_history::PerformanceBand::Poor);
        assert_eq!(worker.expected.unwrap().ths, 20.0);
    }

    #[tokio::test]
    async fn test_auto_detect_after_enough_samples() {
        let (mut state, store) = memory_state().await;
        for i in 0..12u64 {
            state.apply_snapshot(snapshot(i * 60, i, 10.0, &["w1"])).await;
        }
        let entry = *state.expected().get("w1").unwrap();
        assert!(entry.auto_detected);
        assert!((entry.ths - 10.0).abs() < 1e-9);
        assert!(store.get_raw(keys::EXPECTED_HASHRATES).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_worker_view_reports_last_share_age() {
        let (mut state, _) = memory_state().await;
        let body = json!({
            "workers": [
                { "workername": "bc1qaddr.w1", "hashrate1m": "10T", "lastshare": 1_000 },
                { "workername": "bc1qaddr.w2", "hashrate1m": "10T" },
            ],
        });
        state.apply_snapshot(PoolSnapshot::from_json(&body, 1_300)).await;

        let view = state.view(1_300);
        let w1 = view.workers.iter().find(|w| w.name == "w1").unwrap();
        assert_eq!(w1.last_share_age.as_deref(), Some("5m ago"));
        let w2 = view.workers.iter().find(|w| w.name == "w2").unwrap();
        assert!(w2.last_share_age.is_none());
    }

    #[tokio::test]
    async fn test_absent_polls_count_against_uptime() {
        let (mut state, _) = memory_state().await;
        let mut ts = 0;
        for _ in 0..10 {
            ts += 60;
            state.apply_snapshot(snapshot(ts, 0, 10.0, &["w1", "w2"])).await;
        }
        for _ in 0..10 {
            ts += 60;
            state.apply_snapshot(snapshot(ts, 0, 10.0, &["w2"])).await;
        }
        ts += 60;
        state.apply_snapshot(snapshot(ts, 0, 10.0, &["w1", "w2"])).await;

        let series = state.history().performance("w1").unwrap();
        assert_eq!(series.len(), 21);

        let view = state.view(ts);
        let w1 = view.workers.iter().find(|w| w.name == "w1").unwrap();
        assert!((w1.health.uptime - 100.0 * 11.0 / 21.0).abs() < 1e-9);
        let w2 = view.workers.iter().find(|w| w.name == "w2").unwrap();
        assert_eq!(w2.health.uptime, 100.0);
    }

    #[tokio::test]
    async fn test_departed_worker_history_is_bounded_and_pruned() {
        let settings = MonitorSettings {
            history_capacity: 4,
            ..MonitorSettings::default()
        };
        let mut state =
            MonitorState::load(settings, Arc::new(MemoryStateStore::new()), Vec::new()).await;

        state.apply_snapshot(snapshot(60, 0, 10.0, &["old"])).await;
        // padding stops once the series is all idle samples
        for i in 2..=6u64 {
            state.apply_snapshot(snapshot(i * 60, 0, 10.0, &["new"])).await;
        }
        let old = state.history().performance("old").unwrap();
        assert_eq!(old.len(), 4);
        assert!(old.iter().all(|p| p.value.actual_ths == 0.0));
        assert_eq!(old.latest().unwrap().timestamp, 300);

        // horizon is 4 polls of 60s past the last padded point
        state.apply_snapshot(snapshot(540, 0, 10.0, &["new"])).await;
        assert!(state.history().performance("old").is_some());
        state.apply_snapshot(snapshot(541, 0, 10.0, &["new"])).await;
        assert!(state.history().performance("old").is_none());
        assert!(state.history().performance("new").is_some());

        // churning names never accumulates series
        for i in 0..50u64 {
            let name = format!("rig{}", i);
            state
                .apply_snapshot(snapshot(1_000 + i * 60, 0, 10.0, &[name.as_str()]))
                .await;
        }
        assert!(state.history().performance_workers().count() <= 9);
    }

    #[tokio::test]
    async fn test_mark_read() {
        let (mut state, _) = memory_state().await;
        state.apply_snapshot(snapshot(100, 0, 5.0, &["w1"])).await;
        state.apply_snapshot(snapshot(200, 5, 5.0, &["w1"])).await;
        assert_eq!(state.activity().unread_count(), 2);

        let id = state.activity().recent(1)[0].id;
        assert_eq!(state.mark_read(Some(id)).await, Ok(1));
        assert_eq!(state.mark_read(Some(9999)).await, Err(ValidationError::UnknownEvent(9999)));
        assert_eq!(state.mark_read(None).await, Ok(1));
        assert_eq!(state.activity().unread_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_interval_validation() {
        let (mut state, _) = memory_state().await;
        assert!(state.set_poll_interval(1).await.is_err());
        assert_eq!(state.poll_interval(), Duration::from_secs(60));
        assert_eq!(state.set_poll_interval(30).await, Ok(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_state_restored_from_store() {
        let store = Arc::new(MemoryStateStore::new());
        {
            let mut state =
                MonitorState::load(MonitorSettings::default(), store.clone(), Vec::new()).await;
            state.apply_snapshot(snapshot(100, 0, 5.0, &["w1"])).await;
            state.set_worker_url("w1", "http://10.0.0.2").await.unwrap();
            state.set_poll_interval(15).await.unwrap();
            state.flush().await.unwrap();
        }

        let state = MonitorState::load(MonitorSettings::default(), store, Vec::new()).await;
        assert_eq!(state.history().hashrate.len(), 1);
        assert_eq!(state.activity().len(), 1);
        assert_eq!(state.worker_urls().get("w1"), Some("http://10.0.0.2/"));
        assert_eq!(state.poll_interval(), Duration::from_secs(15));
        // snapshots themselves are not persisted
        assert!(state.current().is_none());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_not_fatal() {
        let mut state =
            MonitorState::load(MonitorSettings::default(), Arc::new(FailingStore), Vec::new())
                .await;

        state.apply_snapshot(snapshot(100, 0, 5.0, &["w1"])).await;
        state.set_expected_hashrate("w1", 5.0).await.unwrap();

        assert_eq!(state.history().hashrate.len(), 1);
        assert_eq!(state.expected().expected_ths("w1"), Some(5.0));
        assert!(matches!(state.flush().await, Err(MonitorError::Storage(_))));
    }

    #[tokio::test]
    async fn test_run_monitor_applies_outcomes_and_commands() {
        let (state, _) = memory_state().await;
        let view = Arc::new(ViewStorage::new());
        let (outcome_tx, outcome_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);
        let client = MonitorClient::new(command_tx);

        let task = tokio::spawn(run_monitor(state, outcome_rx, command_rx, None, view.clone()));

        outcome_tx
            .send(PollOutcome::Snapshot(snapshot(100, 10, 40.0, &["w1"])))
            .await
            .unwrap();
        client.set_expected_hashrate("w1".to_string(), 8.0).await.unwrap();
        assert!(matches!(
            client.set_poll_interval(1).await,
            Err(MonitorError::Validation(_))
        ));

        drop(outcome_tx);
        let state = task.await.unwrap();
        assert_eq!(state.current().unwrap().timestamp, 100);
        assert_eq!(state.expected().expected_ths("w1"), Some(8.0));

        let published = view.get().unwrap();
        assert_eq!(published.snapshot.as_ref().unwrap().timestamp, 100);
        assert_eq!(published.workers[0].expected.unwrap().ths, 8.0);

        // monitor gone
        assert!(matches!(
            client.mark_read(None).await,
            Err(MonitorError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_repeated_failures_all_logged_once_shown() {
        let sink = Arc::new(CountingSink::default());
        let mut state = MonitorState::load(
            MonitorSettings::default(),
            Arc::new(MemoryStateStore::new()),
            vec![sink.clone() as Arc<dyn NotificationSink>],
        )
        .await;

        state.record_failure(&FetchError::Status(500), 60).await;
        state.record_failure(&FetchError::Status(500), 70).await;

        assert_eq!(state.activity().len(), 2);
        assert_eq!(sink.banners.load(Ordering::SeqCst), 1);
    }
}
