//! Operation results and their wire form.

use docshard_rpc::codec::{self, serialize_document};
use docshard_rpc::{Document, OperationKind, ProtocolError, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Result of `insertOne`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOneResult {
	pub acknowledged: bool,
	pub inserted_id: Value,
}

/// Result of `insertMany`. `inserted_ids` is keyed by input position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertManyResult {
	pub acknowledged: bool,
	pub inserted_count: u64,
	pub inserted_ids: IndexMap<usize, Value>,
}

/// Result of `updateOne` and `updateMany`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
	pub acknowledged: bool,
	pub matched_count: u64,
	pub modified_count: u64,
	pub upserted_count: u64,
	#[serde(default)]
	pub upserted_id: Option<Value>,
}

/// Result of `deleteOne` and `deleteMany`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
	pub acknowledged: bool,
	pub deleted_count: u64,
}

/// What a dispatched [`Operation`](crate::Operation) produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
	/// `findOne` and the `findOneAndX` family.
	Document(Option<Document>),
	/// `find` and `aggregate`, fully materialized.
	Documents(Vec<Document>),
	InsertOne(InsertOneResult),
	InsertMany(InsertManyResult),
	Update(UpdateResult),
	Delete(DeleteResult),
	/// `distinct`.
	Values(Vec<Value>),
	/// `countDocuments`.
	Count(u64),
}

impl Outcome {
	/// Tagged JSON form sent back over the wire.
	pub fn to_json(&self) -> JsonValue {
		match self {
			Outcome::Document(doc) => doc.as_ref().map_or(JsonValue::Null, serialize_document),
			Outcome::Documents(docs) => JsonValue::Array(docs.iter().map(serialize_document).collect()),
			Outcome::InsertOne(result) => to_json(result),
			Outcome::InsertMany(result) => to_json(result),
			Outcome::Update(result) => to_json(result),
			Outcome::Delete(result) => to_json(result),
			Outcome::Values(values) => JsonValue::Array(values.iter().map(codec::serialize).collect()),
			Outcome::Count(n) => JsonValue::from(*n),
		}
	}

	/// Decodes a reply to an operation of `kind`.
	pub fn from_json(kind: OperationKind, json: JsonValue) -> Result<Self, ProtocolError> {
		let outcome = match kind {
			OperationKind::FindOne | OperationKind::FindOneAndUpdate | OperationKind::FindOneAndDelete | OperationKind::FindOneAndReplace => match codec::deserialize(&json) {
				Value::Null => Outcome::Document(None),
				Value::Document(doc) => Outcome::Document(Some(doc)),
				other => return Err(unexpected(kind, "a document or null", &other)),
			},
			OperationKind::Find | OperationKind::Aggregate => match codec::deserialize(&json) {
				Value::Array(items) => Outcome::Documents(
					items
						.into_iter()
						.map(|item| item.into_document().ok_or_else(|| ProtocolError::InvalidPayload(format!("{kind}: result array holds a non-document"))))
						.collect::<Result<_, _>>()?,
				),
				other => return Err(unexpected(kind, "an array", &other)),
			},
			OperationKind::InsertOne => Outcome::InsertOne(serde_json::from_value(json)?),
			OperationKind::InsertMany => Outcome::InsertMany(serde_json::from_value(json)?),
			OperationKind::UpdateOne | OperationKind::UpdateMany => Outcome::Update(serde_json::from_value(json)?),
			OperationKind::DeleteOne | OperationKind::DeleteMany => Outcome::Delete(serde_json::from_value(json)?),
			OperationKind::Distinct => match codec::deserialize(&json) {
				Value::Array(items) => Outcome::Values(items),
				other => return Err(unexpected(kind, "an array", &other)),
			},
			OperationKind::CountDocuments => match json.as_u64() {
				Some(n) => Outcome::Count(n),
				None => return Err(ProtocolError::InvalidPayload(format!("{kind}: expected a count, got {json}"))),
			},
		};
		Ok(outcome)
	}

	/// Single-document view.
	pub fn into_document(self) -> Option<Document> {
		match self {
			Outcome::Document(doc) => doc,
			_ => None,
		}
	}
}

fn to_json<T: Serialize>(result: &T) -> JsonValue {
	serde_json::to_value(result).unwrap_or_else(|error| {
		tracing::warn!(%error, "outcome.encode_failed");
		JsonValue::Null
	})
}

fn unexpected(kind: OperationKind, expected: &str, got: &Value) -> ProtocolError {
	ProtocolError::InvalidPayload(format!("{kind}: expected {expected}, got {}", got.type_name()))
}
