use clap::Parser;
use serde::Deserialize;
use stats_history::{NetworkConditions, PowerModel, DEFAULT_SERIES_CAPACITY};
use std::{fs, path::PathBuf, time::Duration};

use crate::error::ValidationError;

pub const MIN_POLL_INTERVAL_SECS: u64 = 5;

/// Holds the parsed CLI arguments.
#[derive(Parser, Debug)]
#[command(author, version, about = "Solo mining pool monitor", long_about = None)]
pub struct Args {
    #[arg(
        short = 'c',
        long = "config",
        help = "Path to the TOML configuration file",
        default_value = "config/pool-monitor.toml"
    )]
    pub config_path: PathBuf,
    #[arg(short = 'u', long = "url", help = "Pool metrics endpoint (overrides endpoint.url)")]
    pub url: Option<String>,
    #[arg(short = 'l', long = "listen", help = "HTTP API listen address (overrides server.listen_address)")]
    pub listen: Option<String>,
    #[arg(
        short = 'f',
        long = "log-file",
        help = "Path to the log file. If not set, logs will only be written to stdout."
    )]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub activity: ActivityConfig,
    pub notifications: NotificationsConfig,
    pub network: NetworkConfig,
    pub power: PowerConfig,
    #[serde(skip)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub pool_idle_timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8000/users/".to_string(),
            poll_interval_secs: 60,
            request_timeout_secs: 30,
            pool_idle_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8082".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file for persisted state; in-memory only when unset
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub luck_window_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SERIES_CAPACITY,
            luck_window_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub max_events: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self { max_events: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub system_notifications: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            system_notifications: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub global_hashrate_ths: f64,
    pub block_reward_btc: f64,
    pub btc_price_usd: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            global_hashrate_ths: 700_000_000.0,
            block_reward_btc: 3.125,
            btc_price_usd: 60_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub kw_per_th: f64,
    /// Used when the snapshot carries no price forecast
    pub default_electricity_cents: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            kw_per_th: 0.03,
            default_electricity_cents: 5.0,
        }
    }
}

impl Config {
    pub fn from_args() -> Result<Self, Box<dyn std::error::Error>> {
        let args = Args::parse();
        Self::from_parsed(args)
    }

    pub fn from_parsed(args: Args) -> Result<Self, Box<dyn std::error::Error>> {
        // A missing config file means defaults
        let config_str = fs::read_to_string(&args.config_path).unwrap_or_default();
        let mut config = Self::from_toml_str(&config_str)?;

        if let Some(url) = args.url {
            config.endpoint.url = url;
        }
        if let Some(listen) = args.listen {
            config.server.listen_address = listen;
        }
        config.log_file = args.log_file;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, toml::de::Error> {
        if config_str.trim().is_empty() {
            return Ok(Self::default());
        }
        toml::from_str(config_str)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_poll_interval(self.endpoint.poll_interval_secs)?;
        reqwest::Url::parse(&self.endpoint.url)
            .map_err(|e| ValidationError::InvalidEndpoint(e.to_string()))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.endpoint.poll_interval_secs)
    }

    pub fn network_conditions(&self) -> NetworkConditions {
        NetworkConditions {
            global_hashrate_ths: self.network.global_hashrate_ths,
            block_reward_btc: self.network.block_reward_btc,
            btc_price_usd: self.network.btc_price_usd,
        }
    }

    pub fn power_model(&self) -> PowerModel {
        PowerModel {
            kw_per_th: self.power.kw_per_th,
        }
    }
}

pub fn validate_poll_interval(secs: u64) -> Result<(), ValidationError> {
    if secs < MIN_POLL_INTERVAL_SECS {
        return Err(ValidationError::PollIntervalTooShort {
            min: MIN_POLL_INTERVAL_SECS,
            got: secs,
        });
    }
    Ok(())
}
