//! Store errors.

use docshard_rpc::ProtocolError;
use thiserror::Error;

use crate::SessionId;

/// Server error codes raised by the in-memory engine.
pub mod codes {
	/// Malformed argument or unknown query operator.
	pub const BAD_VALUE: i32 = 2;
	/// Update touched a path through a non-document value.
	pub const PATH_NOT_VIABLE: i32 = 28;
	/// Unknown update modifier.
	pub const FAILED_TO_PARSE: i32 = 9;
	/// Arithmetic update on a non-numeric field, or array operator on a non-array.
	pub const TYPE_MISMATCH: i32 = 14;
	/// Update would change `_id`.
	pub const IMMUTABLE_FIELD: i32 = 66;
	/// Duplicate `_id` on insert.
	pub const DUPLICATE_KEY: i32 = 11000;
	/// Unknown aggregation stage.
	pub const UNRECOGNIZED_STAGE: i32 = 40324;
	/// Mixed inclusion and exclusion in a projection.
	pub const PROJECTION_MIX: i32 = 31254;
}

/// Errors produced by a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Error)]
pub enum StoreError {
	/// The backing store is unreachable. Not retried.
	#[error("connection error: {0}")]
	Connection(String),

	/// The store rejected the operation.
	#[error("operation failed ({code}): {message}")]
	Operation {
		/// Server error code, see [`codes`].
		code: i32,
		/// Human readable reason.
		message: String,
	},

	/// An argument has the wrong shape for its operation.
	#[error("invalid argument: {0}")]
	InvalidArgument(String),

	/// Commit lost an optimistic write race with another writer.
	#[error("write conflict on collection `{collection}`, transaction aborted")]
	WriteConflict {
		/// First collection found modified since the transaction started.
		collection: String,
	},

	/// The transaction was already aborted.
	#[error("transaction aborted")]
	TransactionAborted,

	/// Unknown or already ended session.
	#[error("no such session: {0}")]
	NoSuchSession(SessionId),

	/// Commit or abort without a running transaction.
	#[error("session {0} has no transaction in progress")]
	NoTransaction(SessionId),

	/// Wire-level failure while decoding arguments or results.
	#[error(transparent)]
	Protocol(#[from] ProtocolError),
}

impl StoreError {
	/// Builds [`StoreError::Operation`].
	pub fn operation(code: i32, message: impl Into<String>) -> Self {
		Self::Operation { code, message: message.into() }
	}

	/// Server error code, when there is one.
	pub fn code(&self) -> Option<i32> {
		match self {
			Self::Operation { code, .. } => Some(*code),
			Self::WriteConflict { .. } => Some(112),
			_ => None,
		}
	}
}

/// Result type for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
