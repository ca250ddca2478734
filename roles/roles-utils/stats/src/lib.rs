pub mod extract;
pub mod stats_adapter;
pub mod stats_client;
pub mod stats_poller;

// Re-export snapshot types
pub use stats_adapter::{
    unix_timestamp, BlockOdds, HashrateWindows, PoolSnapshot, PricePoint, WorkerRecord,
};
pub use stats_client::{FetchError, HttpSnapshotSource, SnapshotSource};
pub use stats_poller::{spawn_poller, PollOutcome, PollerCommand, PollerHandle};
