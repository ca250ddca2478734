use stats_history::StorageError;
use thiserror::Error;

/// Rejected user input. Nothing is mutated when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Expected hashrate must be a positive number of TH/s, got {0}")]
    InvalidHashrate(f64),

    #[error("Worker name must not be empty")]
    EmptyWorkerName,

    #[error("Invalid URL for worker {worker}: {reason}")]
    InvalidUrl { worker: String, reason: String },

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("Poll interval must be at least {min} seconds, got {got}")]
    PollIntervalTooShort { min: u64, got: u64 },

    #[error("No activity event with id {0}")]
    UnknownEvent(u64),

    #[error("Invalid request body: {0}")]
    MalformedBody(String),
}

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Monitor task is not running")]
    Unavailable,
}
