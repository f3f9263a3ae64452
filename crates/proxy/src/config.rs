//! Proxy configuration.
//!
//! ```toml
//! shards = 2
//! instance_prefix = "mongo_shard_"
//! database = "app"
//! dev_direct = false
//!
//! [pool]
//! max_pool_size = 10
//! max_connecting = 5
//!
//! [heartbeat]
//! interval_ms = 50000
//! ping_every = 10
//!
//! [mailbox]
//! capacity = 64
//! ```

use std::path::Path;
use std::time::Duration;

use docshard_store::PoolOptions;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level proxy settings. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
	/// Number of coordinator instances keys are spread over.
	pub shards: u32,
	/// Coordinator instance names are this prefix plus the shard index.
	pub instance_prefix: String,
	/// Database every coordinator connects to.
	pub database: String,
	/// Talk to the store in-process instead of through coordinators.
	pub dev_direct: bool,
	pub pool: PoolOptions,
	pub heartbeat: HeartbeatConfig,
	pub mailbox: MailboxConfig,
}

impl Default for ProxyConfig {
	fn default() -> Self {
		Self {
			shards: 2,
			instance_prefix: "mongo_shard_".to_string(),
			database: "app".to_string(),
			dev_direct: false,
			pool: PoolOptions::default(),
			heartbeat: HeartbeatConfig::default(),
			mailbox: MailboxConfig::default(),
		}
	}
}

/// Keep-alive schedule for coordinators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeartbeatConfig {
	/// Delay between wakes. Must stay below the host's idle eviction window (60 s).
	pub interval_ms: u64,
	/// Every this many wakes, the connection is pinged.
	pub ping_every: u32,
}

impl Default for HeartbeatConfig {
	fn default() -> Self {
		Self { interval_ms: 50_000, ping_every: 10 }
	}
}

impl HeartbeatConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}
}

/// Coordinator mailbox sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailboxConfig {
	pub capacity: usize,
}

impl Default for MailboxConfig {
	fn default() -> Self {
		Self { capacity: 64 }
	}
}

impl ProxyConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Io { path: path.to_path_buf(), error })?;
		Self::from_toml_str(&source)
	}

	/// Rejects values the proxy cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let checks = [
			(self.shards == 0, "shards", "must be at least 1"),
			(self.database.is_empty(), "database", "must not be empty"),
			(self.pool.max_pool_size == 0, "pool.max_pool_size", "must be at least 1"),
			(self.pool.max_connecting == 0, "pool.max_connecting", "must be at least 1"),
			(self.heartbeat.interval_ms == 0, "heartbeat.interval_ms", "must be positive"),
			(self.heartbeat.ping_every == 0, "heartbeat.ping_every", "must be at least 1"),
			(self.mailbox.capacity == 0, "mailbox.capacity", "must be at least 1"),
		];
		match checks.into_iter().find(|(failed, ..)| *failed) {
			Some((_, field, reason)) => Err(ConfigError::Invalid { field, reason }),
			None => Ok(()),
		}
	}
}
