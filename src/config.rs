//! Configuration system for the skin fleet
//!
//! One TOML file describes the broker connection, the sweep targets, the
//! session worker, and the identity pool. Everything beyond the broker URI
//! and the server list has a sensible default.

use crate::fleet::SweepConfig;
use crate::identity::{Identity, IdentityPool};
use crate::queue::QueueTuning;
use crate::session::RelayConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetConfig {
    pub queue: QueueSection,
    pub fleet: FleetSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub identities: Vec<IdentityEntry>,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSection {
    /// Broker URI (`amqp://` or `amqps://`)
    pub uri: String,
    /// Also declare and notify the fanout exchange from this process
    #[serde(default)]
    pub enable_fanout: bool,
    /// Delay between reconnect attempts in seconds
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

/// Sweep loop settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetSection {
    /// Server names to sweep, with or without an explicit port
    pub servers: Vec<String>,
    /// Port appended to server names without one
    #[serde(default = "default_game_port")]
    pub default_port: u16,
    /// Pause after each server's endpoints in seconds
    #[serde(default = "default_spawn_pacing_secs")]
    pub spawn_pacing_secs: u64,
    /// Pause between sweeps in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Delay before retrying a failed resolution in seconds
    #[serde(default = "default_resolve_retry_secs")]
    pub resolve_retry_secs: u64,
}

/// Session worker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Protocol worker executable started once per endpoint
    #[serde(default = "default_worker")]
    pub worker: String,
    /// Fixed arguments for every worker invocation
    #[serde(default)]
    pub worker_args: Vec<String>,
    /// Endpoint cooldown after a failed session in seconds
    #[serde(default = "default_failure_cooldown_secs")]
    pub failure_cooldown_secs: u64,
    /// Directory holding persisted identity tokens
    #[serde(default = "default_token_dir")]
    pub token_dir: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            worker: default_worker(),
            worker_args: Vec::new(),
            failure_cooldown_secs: default_failure_cooldown_secs(),
            token_dir: default_token_dir(),
        }
    }
}

/// One configured persona
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityEntry {
    pub name: String,
}

fn default_reconnect_delay_secs() -> u64 {
    10
}

fn default_game_port() -> u16 {
    19132
}

fn default_spawn_pacing_secs() -> u64 {
    1
}

fn default_sweep_interval_secs() -> u64 {
    5
}

fn default_resolve_retry_secs() -> u64 {
    30
}

fn default_worker() -> String {
    "skinfleet-worker".to_string()
}

fn default_failure_cooldown_secs() -> u64 {
    300
}

fn default_token_dir() -> String {
    "tokens".to_string()
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration file")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FleetConfig {
    /// Load and validate a configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri = url::Url::parse(&self.queue.uri)
            .map_err(|_| ConfigError::InvalidConfig(format!("unparsable broker uri: {}", self.queue.uri)))?;
        if !matches!(uri.scheme(), "amqp" | "amqps") {
            return Err(ConfigError::InvalidConfig(format!(
                "broker uri must use amqp:// or amqps://, got {}",
                self.queue.uri
            )));
        }
        if self.fleet.default_port == 0 {
            return Err(ConfigError::InvalidConfig(
                "fleet.default_port must be non-zero".to_string(),
            ));
        }
        if !self.fleet.servers.is_empty() && self.identities.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "at least one identity is required to run sessions".to_string(),
            ));
        }
        for server in &self.fleet.servers {
            crate::fleet::split_server_address(server, self.fleet.default_port).map_err(|_| {
                ConfigError::InvalidConfig(format!("unusable server address: {server}"))
            })?;
        }
        Ok(())
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            servers: self.fleet.servers.clone(),
            default_port: self.fleet.default_port,
            spawn_pacing: Duration::from_secs(self.fleet.spawn_pacing_secs),
            sweep_interval: Duration::from_secs(self.fleet.sweep_interval_secs),
            resolve_retry: Duration::from_secs(self.fleet.resolve_retry_secs),
        }
    }

    pub fn queue_tuning(&self) -> QueueTuning {
        QueueTuning {
            reconnect_delay: Duration::from_secs(self.queue.reconnect_delay_secs),
            ..Default::default()
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            worker: self.session.worker.clone(),
            args: self.session.worker_args.clone(),
            failure_cooldown: Duration::from_secs(self.session.failure_cooldown_secs),
            token_dir: self.session.token_dir.clone(),
        }
    }

    pub fn identity_pool(&self) -> IdentityPool {
        IdentityPool::new(
            self.identities
                .iter()
                .map(|entry| Identity::new(entry.name.clone()))
                .collect(),
        )
    }
}
