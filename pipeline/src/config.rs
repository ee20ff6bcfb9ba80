//! Configuration for the pipeline node

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordering service
    pub ordering: OrderingConfig,

    /// Stateless validation limits
    pub validation: ValidationConfig,

    /// Agreement round
    pub consensus: ConsensusConfig,

    /// Subscriptions and status cache
    pub observation: ObservationConfig,

    /// Ledger configuration
    pub ledger: ledger_core::Config,
}

/// Ordering service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderingConfig {
    /// Maximum transactions per proposal (also the round size trigger)
    pub max_proposal_size: usize,

    /// Round interval (ms)
    pub round_interval_ms: u64,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            max_proposal_size: 10,
            round_interval_ms: 500,
        }
    }
}

impl OrderingConfig {
    /// Round interval as a duration
    pub fn round_interval(&self) -> Duration {
        Duration::from_millis(self.round_interval_ms)
    }
}

/// Stateless validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Oldest accepted creation time, relative to now (ms)
    pub max_past_age_ms: u64,

    /// Furthest accepted creation time in the future (ms)
    pub max_future_skew_ms: u64,

    /// Maximum commands per transaction
    pub max_commands_per_tx: usize,

    /// Maximum declared quorum
    pub max_quorum: u32,

    /// Maximum transfer description length (bytes)
    pub max_description_len: usize,

    /// Maximum account detail key length (bytes)
    pub max_detail_key_len: usize,

    /// Maximum account detail value length (bytes)
    pub max_detail_value_len: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_past_age_ms: 24 * 60 * 60 * 1000, // 24 hours
            max_future_skew_ms: 5 * 60 * 1000,    // 5 minutes
            max_commands_per_tx: 1000,
            max_quorum: 128,
            max_description_len: 64,
            max_detail_key_len: 64,
            max_detail_value_len: 4096,
        }
    }
}

/// Agreement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Time allowed for one agreement round (ms)
    pub agreement_timeout_ms: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            agreement_timeout_ms: 2000,
        }
    }
}

impl ConsensusConfig {
    /// Agreement timeout as a duration
    pub fn agreement_timeout(&self) -> Duration {
        Duration::from_millis(self.agreement_timeout_ms)
    }
}

/// Observation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservationConfig {
    /// Buffered events per subscription channel
    pub channel_capacity: usize,

    /// Transactions tracked by the status cache
    pub status_capacity: usize,

    /// Blocks for which excluded transactions stay resolvable by `await_block`
    pub excluded_retention_blocks: u64,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            status_capacity: 100_000,
            excluded_retention_blocks: 1_000,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> crate::Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| crate::Error::Config(format!("Invalid value for {}: {}", name, value))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config {
            ledger: ledger_core::Config::from_env()?,
            ..Config::default()
        };

        if let Some(size) = env_parse("PIPELINE_MAX_PROPOSAL_SIZE")? {
            config.ordering.max_proposal_size = size;
        }

        if let Some(interval) = env_parse("PIPELINE_ROUND_INTERVAL_MS")? {
            config.ordering.round_interval_ms = interval;
        }

        if let Some(timeout) = env_parse("PIPELINE_AGREEMENT_TIMEOUT_MS")? {
            config.consensus.agreement_timeout_ms = timeout;
        }

        if let Some(age) = env_parse("PIPELINE_MAX_PAST_AGE_MS")? {
            config.validation.max_past_age_ms = age;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.ordering.max_proposal_size == 0 {
            return Err(crate::Error::Config(
                "ordering.max_proposal_size must be at least 1".to_string(),
            ));
        }
        if self.ordering.round_interval_ms == 0 {
            return Err(crate::Error::Config(
                "ordering.round_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.observation.channel_capacity == 0 {
            return Err(crate::Error::Config(
                "observation.channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.observation.status_capacity == 0 {
            return Err(crate::Error::Config(
                "observation.status_capacity must be at least 1".to_string(),
            ));
        }
        if self.observation.excluded_retention_blocks == 0 {
            return Err(crate::Error::Config(
                "observation.excluded_retention_blocks must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
