use notification_hooks::{LogSink, NotificationSink};
use stats::{spawn_poller, HttpSnapshotSource};
use stats_history::{MemoryStateStore, SqliteStateStore, StateStore};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use pool_monitor::{
    api::run_http_server, config::Config, run_monitor, MonitorClient, MonitorSettings,
    MonitorState, ViewStorage,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_args()?;

    // Setup tracing with optional file output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt().with_env_filter(env_filter);

    if let Some(log_file) = &config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| format!("Failed to open log file {}: {}", log_file.display(), e))?;
        fmt_layer.with_writer(Arc::new(file)).init();
    } else {
        fmt_layer.init();
    }

    info!("Starting pool monitor");
    info!("Pool endpoint: {}", config.endpoint.url);
    info!("HTTP API address: {}", config.server.listen_address);

    let store: Arc<dyn StateStore> = match &config.storage.db_path {
        Some(path) => match SqliteStateStore::new(path).await {
            Ok(store) => {
                info!("Persisting state to {}", path.display());
                Arc::new(store)
            }
            Err(e) => {
                warn!(
                    "Failed to open state database {}: {}. State will not survive restarts",
                    path.display(),
                    e
                );
                Arc::new(MemoryStateStore::new())
            }
        },
        None => Arc::new(MemoryStateStore::new()),
    };

    let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
    let state = MonitorState::load(MonitorSettings::from_config(&config), store, sinks).await;
    info!("Polling every {} seconds", state.poll_interval().as_secs());

    let source = Arc::new(HttpSnapshotSource::new(
        config.endpoint.url.clone(),
        Duration::from_secs(config.endpoint.request_timeout_secs),
        Duration::from_secs(config.endpoint.pool_idle_timeout_secs),
    )?);

    let (outcome_tx, outcome_rx) = mpsc::channel(16);
    let (command_tx, command_rx) = mpsc::channel(16);
    let (poller, poller_task) = spawn_poller(source, state.poll_interval(), outcome_tx);

    let view = Arc::new(ViewStorage::new());
    let monitor_task = tokio::spawn(run_monitor(
        state,
        outcome_rx,
        command_rx,
        Some(poller.clone()),
        view.clone(),
    ));

    tokio::select! {
        result = run_http_server(
            config.server.listen_address.clone(),
            view,
            MonitorClient::new(command_tx),
        ) => {
            if let Err(e) = result {
                error!("HTTP server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    // Stopping the poller closes the outcome channel, which ends the monitor
    poller.stop();
    if let Err(e) = poller_task.await {
        warn!("Poller task ended abnormally: {}", e);
    }
    match monitor_task.await {
        Ok(state) => {
            if let Err(e) = state.flush().await {
                error!("Failed to persist state on shutdown: {}", e);
            }
        }
        Err(e) => error!("Monitor task ended abnormally: {}", e),
    }

    info!("Pool monitor stopped");
    Ok(())
}
