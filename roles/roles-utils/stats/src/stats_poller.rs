use crate::{
    stats_adapter::{unix_timestamp, PoolSnapshot},
    stats_client::{FetchError, SnapshotSource},
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

/// Result of one poll tick, handed to the monitor.
#[derive(Debug)]
pub enum PollOutcome {
    Snapshot(PoolSnapshot),
    Failed(FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerCommand {
    /// Poll at this interval; changing it restarts the countdown
    Run(Duration),
    Stop,
}

/// Control side of a running poller.
#[derive(Debug, Clone)]
pub struct PollerHandle {
    control: Arc<watch::Sender<PollerCommand>>,
}

impl PollerHandle {
    pub fn set_interval(&self, interval: Duration) {
        let _ = self.control.send(PollerCommand::Run(interval));
    }

    pub fn stop(&self) {
        let _ = self.control.send(PollerCommand::Stop);
    }

    pub fn current(&self) -> PollerCommand {
        *self.control.borrow()
    }
}

/// Spawn the polling loop on the current runtime.
pub fn spawn_poller<S>(
    source: Arc<S>,
    interval: Duration,
    outcomes: mpsc::Sender<PollOutcome>,
) -> (PollerHandle, JoinHandle<()>)
where
    S: SnapshotSource + ?Sized + 'static,
{
    let (tx, rx) = watch::channel(PollerCommand::Run(interval));
    let task = tokio::spawn(run_poller(source, rx, outcomes));
    (
        PollerHandle {
            control: Arc::new(tx),
        },
        task,
    )
}

fn new_interval(period: Duration) -> Interval {
    let mut interval = time::interval(period);
    // A tick that fires while a fetch is pending is dropped, never queued
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Polling loop: one fetch per tick, never more than one in flight.
///
/// Exits when `Stop` is received, the control handle is dropped, or the
/// outcome receiver goes away.
pub async fn run_poller<S>(
    source: Arc<S>,
    mut control: watch::Receiver<PollerCommand>,
    outcomes: mpsc::Sender<PollOutcome>,
) where
    S: SnapshotSource + ?Sized,
{
    let mut period = match *control.borrow_and_update() {
        PollerCommand::Run(period) => period,
        PollerCommand::Stop => return,
    };
    let mut interval = new_interval(period);
    let mut last_success: Option<bool> = None;

    info!(
        "Polling {} every {} seconds",
        source.endpoint(),
        period.as_secs()
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            changed = control.changed() => {
                if changed.is_err() {
                    debug!("Poller control dropped, stopping");
                    return;
                }
                match *control.borrow_and_update() {
                    PollerCommand::Stop => {
                        info!("Poller stopped");
                        return;
                    }
                    PollerCommand::Run(next) => {
                        info!("Poll interval changed to {} seconds", next.as_secs());
                        period = next;
                        interval = new_interval(period);
                        continue;
                    }
                }
            }
        }

        let started = Instant::now();
        let result = tokio::select! {
            result = source.fetch() => result,
            changed = control.changed() => {
                if changed.is_err() {
                    return;
                }
                match *control.borrow_and_update() {
                    PollerCommand::Stop => {
                        info!("Poller stopped, abandoning in-flight fetch");
                        return;
                    }
                    PollerCommand::Run(next) => {
                        info!("Poll interval changed to {} seconds, abandoning in-flight fetch", next.as_secs());
                        period = next;
                        interval = new_interval(period);
                        continue;
                    }
                }
            }
        };

        let elapsed = started.elapsed();
        if elapsed > period {
            warn!(
                "Fetch from {} took {:?}, longer than the {:?} poll interval; overlapping ticks skipped",
                source.endpoint(),
                elapsed,
                period
            );
        }

        let outcome = match result {
            Ok(body) => {
                if last_success != Some(true) {
                    info!("Successfully fetched snapshot from {}", source.endpoint());
                    last_success = Some(true);
                }
                // Countdown restarts from the successful fetch
                interval.reset();
                PollOutcome::Snapshot(PoolSnapshot::from_json(&body, unix_timestamp()))
            }
            Err(e) => {
                if last_success != Some(false) {
                    error!("Failed to fetch from {}: {}", source.endpoint(), e);
                    last_success = Some(false);
                }
                PollOutcome::Failed(e)
            }
        };

        if outcomes.send(outcome).await.is_err() {
            debug!("Poll outcome receiver closed, stopping");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSource {
        calls: AtomicUsize,
        fail_on: Vec<usize>,
    }

    #[async_trait::async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch(&self) -> Result<Value, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.contains(&call) {
                Err(FetchError::Status(500))
            } else {
                Ok(json!({ "accepted_shares": call }))
            }
        }

        fn endpoint(&self) -> &str {
            "scripted"
        }
    }

    struct HangingSource;

    #[async_trait::async_trait]
    impl SnapshotSource for HangingSource {
        async fn fetch(&self) -> Result<Value, FetchError> {
            std::future::pending().await
        }

        fn endpoint(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_fetches_immediately() {
        let source = Arc::new(ScriptedSource {
            calls: AtomicUsize::new(0),
            fail_on: vec![],
        });
        let (tx, mut rx) = mpsc::channel(4);
        let (handle, task) = spawn_poller(source, Duration::from_secs(60), tx);

        match rx.recv().await.unwrap() {
            PollOutcome::Snapshot(snapshot) => assert_eq!(snapshot.accepted_shares, 0),
            other => panic!("unexpected outcome {:?}", other),
        }

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported_and_polling_continues() {
        let source = Arc::new(ScriptedSource {
            calls: AtomicUsize::new(0),
            fail_on: vec![1],
        });
        let (tx, mut rx) = mpsc::channel(4);
        let (handle, task) = spawn_poller(source.clone(), Duration::from_secs(60), tx);

        assert!(matches!(rx.recv().await, Some(PollOutcome::Snapshot(_))));
        assert!(matches!(
            rx.recv().await,
            Some(PollOutcome::Failed(FetchError::Status(500)))
        ));
        match rx.recv().await.unwrap() {
            PollOutcome::Snapshot(snapshot) => assert_eq!(snapshot.accepted_shares, 2),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_pending_fetch() {
        let (tx, _rx) = mpsc::channel(1);
        let (handle, task) = spawn_poller(Arc::new(HangingSource), Duration::from_secs(60), tx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop();
        task.await.unwrap();
        assert_eq!(handle.current(), PollerCommand::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_restarts_countdown() {
        let source = Arc::new(ScriptedSource {
            calls: AtomicUsize::new(0),
            fail_on: vec![],
        });
        let (tx, mut rx) = mpsc::channel(4);
        let (handle, task) = spawn_poller(source.clone(), Duration::from_secs(3600), tx);

        assert!(matches!(rx.recv().await, Some(PollOutcome::Snapshot(_))));

        // New interval's first tick fires immediately
        handle.set_interval(Duration::from_secs(10));
        assert!(matches!(rx.recv().await, Some(PollOutcome::Snapshot(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_exits_when_receiver_dropped() {
        let source = Arc::new(ScriptedSource {
            calls: AtomicUsize::new(0),
            fail_on: vec![],
        });
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let (_handle, task) = spawn_poller(source, Duration::from_secs(60), tx);
        task.await.unwrap();
    }
}
