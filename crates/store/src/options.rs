//! Per-operation option records.
//!
//! Every record carries a `session` that never crosses the wire: it is bound
//! inside the coordinator that owns the session. All other fields use the
//! driver's camelCase names, and unset fields are omitted from the wire form.

use docshard_rpc::{Document, Value};
use serde::{Deserialize, Serialize};

use crate::SessionId;

/// Write acknowledgement requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcern {
	/// Acknowledgement count or tag, e.g. `1` or `"majority"`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub w: Option<serde_json::Value>,
	/// Wait for the journal.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub j: Option<bool>,
	/// Acknowledgement timeout in milliseconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub wtimeout: Option<u64>,
}

/// Which image `findOneAndUpdate`/`findOneAndReplace` return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnDocument {
	/// The document as it was before the modification.
	#[default]
	Before,
	/// The document after the modification.
	After,
}

/// Options for `find` and `findOne`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOptions {
	/// Maximum documents returned; `0` means no limit, negative values are taken by magnitude.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub limit: Option<i64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub skip: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sort: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub projection: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub batch_size: Option<u32>,
	#[serde(rename = "maxTimeMS", skip_serializing_if = "Option::is_none")]
	pub max_time_ms: Option<u64>,
	/// Index name or key pattern.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hint: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub collation: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub allow_disk_use: Option<bool>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}

/// Options for `findOneAndUpdate` and `findOneAndReplace`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOneAndModifyOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sort: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub projection: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub upsert: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub return_document: Option<ReturnDocument>,
	#[serde(rename = "maxTimeMS", skip_serializing_if = "Option::is_none")]
	pub max_time_ms: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hint: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub collation: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub write_concern: Option<WriteConcern>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}

/// Options for `findOneAndDelete`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindOneAndDeleteOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sort: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub projection: Option<Document>,
	#[serde(rename = "maxTimeMS", skip_serializing_if = "Option::is_none")]
	pub max_time_ms: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hint: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub collation: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub write_concern: Option<WriteConcern>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}

/// Options for `insertOne`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InsertOneOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub bypass_document_validation: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub write_concern: Option<WriteConcern>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}

/// Options for `insertMany`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InsertManyOptions {
	/// Stop at the first failed insert. Defaults to true.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ordered: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub bypass_document_validation: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub write_concern: Option<WriteConcern>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}

/// Options for `updateOne` and `updateMany`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub upsert: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hint: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub collation: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub write_concern: Option<WriteConcern>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}

/// Options for `deleteOne` and `deleteMany`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hint: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub collation: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub write_concern: Option<WriteConcern>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}

/// Options for `aggregate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub batch_size: Option<u32>,
	#[serde(rename = "maxTimeMS", skip_serializing_if = "Option::is_none")]
	pub max_time_ms: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub allow_disk_use: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub collation: Option<Document>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hint: Option<Value>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}

/// Options for `distinct`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DistinctOptions {
	#[serde(rename = "maxTimeMS", skip_serializing_if = "Option::is_none")]
	pub max_time_ms: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub collation: Option<Document>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}

/// Options for `countDocuments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub limit: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub skip: Option<u64>,
	#[serde(rename = "maxTimeMS", skip_serializing_if = "Option::is_none")]
	pub max_time_ms: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub hint: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub collation: Option<Document>,
	#[serde(skip)]
	pub session: Option<SessionId>,
}
