//! Wire shapes exchanged between a client and a shard coordinator.

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{ProtocolError, Result};

/// The fixed set of operations a coordinator will dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
	/// `findOne(filter, options)`
	FindOne,
	/// `find(filter, options)`
	Find,
	/// `findOneAndUpdate(filter, update, options)`
	FindOneAndUpdate,
	/// `findOneAndDelete(filter, options)`
	FindOneAndDelete,
	/// `findOneAndReplace(filter, replacement, options)`
	FindOneAndReplace,
	/// `insertOne(document, options)`
	InsertOne,
	/// `insertMany(documents, options)`
	InsertMany,
	/// `updateOne(filter, update, options)`
	UpdateOne,
	/// `updateMany(filter, update, options)`
	UpdateMany,
	/// `deleteOne(filter, options)`
	DeleteOne,
	/// `deleteMany(filter, options)`
	DeleteMany,
	/// `aggregate(pipeline, options)`
	Aggregate,
	/// `distinct(field, filter, options)`
	Distinct,
	/// `countDocuments(filter, options)`
	CountDocuments,
}

impl OperationKind {
	/// Positional index of the options record, which is where a transaction
	/// session gets bound.
	pub const fn session_slot(self) -> usize {
		match self {
			OperationKind::FindOne
			| OperationKind::Find
			| OperationKind::InsertOne
			| OperationKind::InsertMany
			| OperationKind::DeleteOne
			| OperationKind::DeleteMany
			| OperationKind::FindOneAndDelete
			| OperationKind::CountDocuments
			| OperationKind::Aggregate => 1,
			OperationKind::UpdateOne
			| OperationKind::UpdateMany
			| OperationKind::FindOneAndUpdate
			| OperationKind::FindOneAndReplace
			| OperationKind::Distinct => 2,
		}
	}

	/// Number of positional arguments the operation accepts, options included.
	pub const fn arity(self) -> usize {
		self.session_slot() + 1
	}

	/// Wire name, e.g. `findOneAndUpdate`.
	pub fn as_str(self) -> &'static str {
		self.into()
	}
}

/// One `{col, op, args}` request. `args` are already codec-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcPayload {
	/// Collection name.
	pub col: String,
	/// Operation to run.
	pub op: OperationKind,
	/// Positional arguments in tagged JSON form.
	#[serde(default)]
	pub args: Vec<JsonValue>,
}

/// Coordinator reply: one tagged JSON value.
pub type RpcResponse = JsonValue;

impl RpcPayload {
	/// Builds a payload.
	pub fn new(col: impl Into<String>, op: OperationKind, args: Vec<JsonValue>) -> Self {
		Self { col: col.into(), op, args }
	}

	/// Validates an untyped request.
	///
	/// The operation name is checked first so that anything outside
	/// [`OperationKind`] fails with [`ProtocolError::UnsupportedOperation`]
	/// regardless of what else is wrong with the payload.
	pub fn from_json(json: &JsonValue) -> Result<Self> {
		let obj = json.as_object().ok_or_else(|| ProtocolError::InvalidPayload("payload must be an object".into()))?;
		let op = match obj.get("op") {
			Some(JsonValue::String(op)) => op.parse::<OperationKind>().map_err(|_| ProtocolError::UnsupportedOperation(op.clone()))?,
			Some(other) => return Err(ProtocolError::UnsupportedOperation(other.to_string())),
			None => return Err(ProtocolError::InvalidPayload("missing `op`".into())),
		};
		let col = match obj.get("col") {
			Some(JsonValue::String(col)) => col.clone(),
			_ => return Err(ProtocolError::InvalidPayload("`col` must be a string".into())),
		};
		let args = match obj.get("args") {
			None | Some(JsonValue::Null) => Vec::new(),
			Some(JsonValue::Array(args)) => args.clone(),
			Some(_) => return Err(ProtocolError::InvalidPayload("`args` must be an array".into())),
		};
		Ok(Self { col, op, args })
	}

	/// Parses and validates raw request bytes.
	pub fn from_slice(bytes: &[u8]) -> Result<Self> {
		let json: JsonValue = serde_json::from_slice(bytes)?;
		Self::from_json(&json)
	}

	/// Untyped wire form.
	pub fn to_json(&self) -> JsonValue {
		json!({ "col": self.col, "op": self.op.as_str(), "args": self.args })
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;
	use strum::IntoEnumIterator;

	use super::*;

	#[rstest]
	#[case("findOne", OperationKind::FindOne, 1)]
	#[case("deleteMany", OperationKind::DeleteMany, 1)]
	#[case("aggregate", OperationKind::Aggregate, 1)]
	#[case("updateOne", OperationKind::UpdateOne, 2)]
	#[case("findOneAndReplace", OperationKind::FindOneAndReplace, 2)]
	#[case("distinct", OperationKind::Distinct, 2)]
	fn wire_names_and_session_slots(#[case] name: &str, #[case] kind: OperationKind, #[case] slot: usize) {
		assert_eq!(name.parse::<OperationKind>().ok(), Some(kind));
		assert_eq!(kind.to_string(), name);
		assert_eq!(kind.session_slot(), slot);
	}

	#[test]
	fn operation_set_is_closed_at_fourteen() {
		assert_eq!(OperationKind::iter().count(), 14);
	}

	#[rstest]
	#[case(json!({ "col": "users", "op": "dropCollection", "args": [] }), "dropCollection")]
	#[case(json!({ "col": 7, "op": "watch" }), "watch")]
	#[case(json!({ "op": 3 }), "3")]
	fn unknown_operation_is_rejected_first(#[case] payload: JsonValue, #[case] op: &str) {
		match RpcPayload::from_json(&payload) {
			Err(ProtocolError::UnsupportedOperation(name)) => assert_eq!(name, op),
			other => panic!("expected unsupported operation, got {other:?}"),
		}
	}

	#[test]
	fn payload_survives_bytes() {
		let payload = RpcPayload::new("users", OperationKind::UpdateMany, vec![json!({}), json!({ "$set": { "a": 1 } })]);
		let bytes = serde_json::to_vec(&payload.to_json()).unwrap();
		assert_eq!(RpcPayload::from_slice(&bytes).unwrap(), payload);
		assert!(matches!(RpcPayload::from_slice(b"{"), Err(ProtocolError::Json(_))));
	}

	#[test]
	fn missing_args_means_empty() {
		let payload = RpcPayload::from_json(&json!({ "col": "c", "op": "find" })).unwrap();
		assert!(payload.args.is_empty());
	}
}
