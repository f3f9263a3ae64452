use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::options::WriteConcern;

/// Identifies one client session on a store connection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
	/// Fresh random id.
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.as_hyphenated())
	}
}

impl fmt::Debug for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SessionId({})", self.0.as_hyphenated())
	}
}

/// Options forwarded to `start_transaction` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOptions {
	/// Read concern level, e.g. `snapshot`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub read_concern: Option<ReadConcern>,
	/// Write acknowledgement requirements.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub write_concern: Option<WriteConcern>,
	/// Read preference mode, e.g. `primary`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub read_preference: Option<String>,
	/// Upper bound for the commit, in milliseconds.
	#[serde(default, rename = "maxCommitTimeMS", skip_serializing_if = "Option::is_none")]
	pub max_commit_time_ms: Option<u64>,
}

/// `{level: ...}` read concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConcern {
	/// Level name.
	pub level: String,
}
