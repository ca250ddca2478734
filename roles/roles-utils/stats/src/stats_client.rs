use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Malformed JSON body: {0}")]
    Parse(String),
}

/// Source of raw pool snapshots.
///
/// The poller only needs a JSON document per tick; keeping the transport
/// behind this trait lets the pipeline be driven without a network.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Perform a single fetch. No retries happen here.
    async fn fetch(&self) -> Result<Value, FetchError>;

    /// Human-readable location, used in logs.
    fn endpoint(&self) -> &str;
}

/// HTTP GET against the pool's metrics endpoint.
pub struct HttpSnapshotSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    pub fn new(
        url: String,
        request_timeout: Duration,
        pool_idle_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { url, client })
    }
}

#[async_trait::async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        debug!("Fetched {} bytes from {}", body.len(), self.url);

        serde_json::from_slice(&body).map_err(|e| FetchError::Parse(e.to_string()))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
