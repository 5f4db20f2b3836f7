//! Node configuration types

use murmur_core::error::{MurmurError, Result};
use murmur_network::{GossipConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `MURMUR_GOSSIP__INTERVAL_MS=20`
pub const ENV_PREFIX: &str = "MURMUR";

/// Complete node configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Gossip engine settings
    #[serde(default)]
    pub gossip: GossipSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Load from an optional TOML file, then apply `MURMUR_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MurmurError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.gossip.interval_ms == 0 {
            return Err(MurmurError::Config(
                "gossip.interval_ms must be greater than zero".into(),
            ));
        }
        if self.gossip.max_batch_size == 0 {
            return Err(MurmurError::Config(
                "gossip.max_batch_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Engine configuration derived from these settings
    pub fn gossip_config(&self) -> GossipConfig {
        GossipConfig {
            gossip_interval: Duration::from_millis(self.gossip.interval_ms),
            retry_timeout: Duration::from_millis(self.gossip.retry_timeout_ms),
            max_batch_size: self.gossip.max_batch_size,
            retry_policy: self.gossip.retry_policy,
            anti_entropy: self.gossip.anti_entropy,
            exclude_sender: self.gossip.exclude_sender,
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MurmurError::Serialization(e.to_string()))
    }
}

/// Gossip settings as written in the config file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipSettings {
    /// Scheduler tick interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Milliseconds before an unacknowledged batch counts as lost
    #[serde(default = "default_retry_timeout_ms")]
    pub retry_timeout_ms: u64,

    /// Maximum values per delta
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// `every_tick` or `on_deadline`
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Replay the whole value set to a peer that has caught up
    #[serde(default = "default_true")]
    pub anti_entropy: bool,

    /// Skip the originating peer when relaying a delta
    #[serde(default = "default_true")]
    pub exclude_sender: bool,
}

fn default_interval_ms() -> u64 {
    50
}

fn default_retry_timeout_ms() -> u64 {
    100
}

fn default_max_batch_size() -> usize {
    128
}

fn default_true() -> bool {
    true
}

impl Default for GossipSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            retry_timeout_ms: default_retry_timeout_ms(),
            max_batch_size: default_max_batch_size(),
            retry_policy: RetryPolicy::default(),
            anti_entropy: true,
            exclude_sender: true,
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
