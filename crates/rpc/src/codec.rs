//! Tagged JSON encoding for [`Value`].
//!
//! Plain JSON has no identifier or timestamp type, so those travel as
//! single-key wrapper objects:
//!
//! | value            | wire form                                  |
//! |------------------|--------------------------------------------|
//! | `ObjectId`       | `{"$oid": "507f1f77bcf86cd799439011"}`     |
//! | `DateTime`       | `{"$date": "2024-01-01T00:00:00.000Z"}`    |
//!
//! Decoding recognizes a wrapper only by exact shape: an object with one key,
//! that key being a tag, and a string payload. A wrapper whose payload does not
//! parse is passed through unchanged as a plain document and a warning is
//! logged. User documents must not use the tag names as field names.
//!
//! Non-finite doubles have no JSON form and encode as `null`.

use serde_json::{Map, Number, Value as JsonValue};

use crate::{DateTime, Document, ObjectId, Value};

/// Wrapper key for identifiers.
pub const OID_TAG: &str = "$oid";
/// Wrapper key for timestamps.
pub const DATE_TAG: &str = "$date";

/// Encodes a value tree into its JSON-only form.
pub fn serialize(value: &Value) -> JsonValue {
	match value {
		Value::Null => JsonValue::Null,
		Value::Bool(b) => JsonValue::Bool(*b),
		Value::Int(i) => JsonValue::Number(Number::from(*i)),
		Value::Double(d) => Number::from_f64(*d).map_or(JsonValue::Null, JsonValue::Number),
		Value::String(s) => JsonValue::String(s.clone()),
		Value::Array(items) => JsonValue::Array(items.iter().map(serialize).collect()),
		Value::Document(doc) => serialize_document(doc),
		Value::ObjectId(id) => tagged(OID_TAG, id.to_hex()),
		Value::DateTime(dt) => tagged(DATE_TAG, dt.to_rfc3339()),
	}
}

/// Encodes a document as a JSON object, preserving key order.
pub fn serialize_document(doc: &Document) -> JsonValue {
	JsonValue::Object(doc.iter().map(|(k, v)| (k.clone(), serialize(v))).collect())
}

/// Decodes the JSON-only form back into a value tree.
pub fn deserialize(json: &JsonValue) -> Value {
	match json {
		JsonValue::Null => Value::Null,
		JsonValue::Bool(b) => Value::Bool(*b),
		JsonValue::Number(n) => match n.as_i64() {
			Some(i) => Value::Int(i),
			None => n.as_f64().map_or(Value::Null, Value::Double),
		},
		JsonValue::String(s) => Value::String(s.clone()),
		JsonValue::Array(items) => Value::Array(items.iter().map(deserialize).collect()),
		JsonValue::Object(map) => decode_tagged(map).unwrap_or_else(|| Value::Document(deserialize_map(map))),
	}
}

/// Decodes a JSON object into a document. Returns `None` for any other JSON
/// type, and for objects that decode to a tagged scalar.
pub fn deserialize_document(json: &JsonValue) -> Option<Document> {
	deserialize(json).into_document()
}

fn deserialize_map(map: &Map<String, JsonValue>) -> Document {
	map.iter().map(|(k, v)| (k.clone(), deserialize(v))).collect()
}

fn tagged(tag: &str, payload: String) -> JsonValue {
	let mut map = Map::with_capacity(1);
	map.insert(tag.to_string(), JsonValue::String(payload));
	JsonValue::Object(map)
}

fn decode_tagged(map: &Map<String, JsonValue>) -> Option<Value> {
	if map.len() != 1 {
		return None;
	}
	let (tag, payload) = map.iter().next()?;
	let payload = payload.as_str()?;
	match tag.as_str() {
		OID_TAG => match ObjectId::parse_str(payload) {
			Ok(id) => Some(Value::ObjectId(id)),
			Err(error) => {
				tracing::warn!(tag = OID_TAG, payload, %error, "codec.tag.malformed");
				None
			}
		},
		DATE_TAG => match DateTime::parse(payload) {
			Some(dt) => Some(Value::DateTime(dt)),
			None => {
				tracing::warn!(tag = DATE_TAG, payload, "codec.tag.malformed");
				None
			}
		},
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use proptest::prelude::*;
	use rstest::rstest;
	use serde_json::json;

	use super::*;
	use crate::doc;

	#[test]
	fn identifier_encodes_as_oid_wrapper() {
		let id = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
		assert_eq!(serialize(&Value::ObjectId(id)), json!({ "$oid": "507f1f77bcf86cd799439011" }));
	}

	#[test]
	fn timestamp_encodes_with_millis_and_zulu() {
		let dt = DateTime::from_millis(1_704_067_200_007).unwrap();
		assert_eq!(serialize(&Value::DateTime(dt)), json!({ "$date": "2024-01-01T00:00:00.007Z" }));
	}

	#[rstest]
	#[case::not_hex(json!({ "$oid": "not-hex" }))]
	#[case::short(json!({ "$oid": "507f1f77" }))]
	#[case::bad_date(json!({ "$date": "the day after tomorrow" }))]
	fn malformed_tag_is_returned_unchanged(#[case] input: JsonValue) {
		let decoded = deserialize(&input);
		assert!(matches!(decoded, Value::Document(_)));
		assert_eq!(serialize(&decoded), input);
	}

	#[rstest]
	#[case::extra_key(json!({ "$oid": "507f1f77bcf86cd799439011", "x": 1 }))]
	#[case::non_string(json!({ "$date": 1_704_067_200_000_i64 }))]
	#[case::unknown_tag(json!({ "$regex": "a.*" }))]
	fn only_exact_shape_is_a_tag(#[case] input: JsonValue) {
		assert!(matches!(deserialize(&input), Value::Document(_)));
	}

	#[test]
	fn bare_date_payload_is_accepted() {
		let decoded = deserialize(&json!({ "$date": "2024-01-01" }));
		assert_eq!(decoded, Value::DateTime(DateTime::from_millis(1_704_067_200_000).unwrap()));
	}

	#[test]
	fn number_split_follows_json_representation() {
		assert_eq!(deserialize(&json!(3)), Value::Int(3));
		assert_eq!(deserialize(&json!(3.5)), Value::Double(3.5));
		assert_eq!(deserialize(&json!(u64::MAX)), Value::Double(u64::MAX as f64));
		assert_eq!(serialize(&Value::Double(f64::NAN)), JsonValue::Null);
	}

	#[rstest]
	#[case(3.0)]
	#[case(-265_001_484_343.214_97)]
	#[case(f64::MAX)]
	#[case(f64::MIN_POSITIVE / 4.0)]
	#[case(9_007_199_254_740_992.0)]
	fn doubles_survive_json_text(#[case] d: f64) {
		let text = serde_json::to_string(&Value::Double(d)).unwrap();
		let back: Value = serde_json::from_str(&text).unwrap();
		assert_eq!(back, Value::Double(d));
	}

	#[test]
	fn nested_document_keeps_key_order() {
		let id = ObjectId::new();
		let value = Value::Document(doc! {
			"z" => 1,
			"a" => doc! { "when" => DateTime::from_millis(0).unwrap(), "ids" => vec![id] },
		});
		let json = serialize(&value);
		assert_eq!(json.as_object().map(|m| m.keys().cloned().collect::<Vec<_>>()), Some(vec!["z".to_string(), "a".to_string()]));
		assert_eq!(deserialize(&json), value);
	}

	fn arb_double() -> impl Strategy<Value = f64> {
		use prop::num::f64::{NEGATIVE, NORMAL, POSITIVE, SUBNORMAL, ZERO};
		prop_oneof![
			-1.0e12..1.0e12f64,
			(-1_000_000i64..1_000_000).prop_map(|n| n as f64),
			POSITIVE | NEGATIVE | NORMAL | SUBNORMAL | ZERO,
		]
	}

	fn arb_value() -> impl Strategy<Value = Value> {
		let leaf = prop_oneof![
			Just(Value::Null),
			any::<bool>().prop_map(Value::Bool),
			any::<i64>().prop_map(Value::Int),
			arb_double().prop_map(Value::Double),
			"[a-z$]{0,8}".prop_map(Value::String),
			any::<[u8; 12]>().prop_map(|b| Value::ObjectId(ObjectId::from_bytes(b))),
			(0i64..253_402_300_799_000).prop_map(|ms| Value::DateTime(DateTime::from_millis(ms).unwrap_or_else(DateTime::epoch))),
		];
		leaf.prop_recursive(4, 48, 6, |inner| {
			prop_oneof![
				prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
				prop::collection::vec(("[a-z]{1,6}", inner), 0..6).prop_map(|pairs| Value::Document(pairs.into_iter().collect())),
			]
		})
	}

	proptest! {
		#[test]
		fn round_trip_law(value in arb_value()) {
			prop_assert_eq!(deserialize(&serialize(&value)), value);
		}

		#[test]
		fn round_trip_survives_text(value in arb_value()) {
			let text = serde_json::to_string(&value).unwrap();
			let back: Value = serde_json::from_str(&text).unwrap();
			prop_assert_eq!(back, value);
		}
	}
}
