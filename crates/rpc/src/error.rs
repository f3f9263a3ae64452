//! Protocol-level errors.

use thiserror::Error;

/// Errors raised while decoding or validating an RPC payload.
#[derive(Debug, Error)]
pub enum ProtocolError {
	/// The operation name is outside the fixed operation set.
	#[error("unsupported operation: {0}")]
	UnsupportedOperation(String),

	/// The payload is structurally wrong (missing field, wrong JSON type, bad argument).
	#[error("invalid payload: {0}")]
	InvalidPayload(String),

	/// The payload bytes are not valid JSON.
	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),
}

/// Result type for protocol operations.
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;
