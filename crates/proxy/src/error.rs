//! Proxy errors.

use std::path::PathBuf;

use docshard_rpc::ProtocolError;
use docshard_store::StoreError;
use thiserror::Error;

/// Errors surfaced to proxy callers.
///
/// Store and protocol failures pass through untouched; the proxy only adds
/// the two failure modes it owns.
#[derive(Debug, Error)]
pub enum Error {
	/// The backing store failed or rejected the operation.
	#[error(transparent)]
	Store(#[from] StoreError),

	/// A payload or result could not be encoded or decoded.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	/// The coordinator went away before answering.
	#[error("coordinator `{name}` unavailable: {reason}")]
	CoordinatorUnavailable {
		/// Instance name, e.g. `mongo_shard_0`.
		name: String,
		/// What happened to the request.
		reason: String,
	},

	/// Invalid proxy configuration.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Errors from loading or validating a [`ProxyConfig`](crate::ProxyConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
	/// TOML syntax or type error.
	#[error("config parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// Reading the configuration file failed.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path that failed to read.
		path: PathBuf,
		/// Underlying error.
		error: std::io::Error,
	},

	/// A value is out of range.
	#[error("invalid config value `{field}`: {reason}")]
	Invalid {
		/// Dotted field name.
		field: &'static str,
		/// Why it was rejected.
		reason: &'static str,
	},
}

/// Result type for proxy operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
