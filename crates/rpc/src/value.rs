//! Domain value tree.

use std::fmt;

use chrono::{NaiveDate, SecondsFormat, TimeZone, Timelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ObjectId;

/// Insertion-ordered document.
pub type Document = IndexMap<String, Value>;

/// UTC timestamp with millisecond precision.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTime(chrono::DateTime<Utc>);

impl DateTime {
	/// Current time, truncated to milliseconds.
	pub fn now() -> Self {
		Self::from_chrono(Utc::now())
	}

	/// The Unix epoch.
	pub fn epoch() -> Self {
		Self(chrono::DateTime::UNIX_EPOCH)
	}

	/// Milliseconds since the Unix epoch. `None` outside chrono's range.
	pub fn from_millis(millis: i64) -> Option<Self> {
		chrono::DateTime::from_timestamp_millis(millis).map(Self)
	}

	/// Truncates sub-millisecond precision away.
	pub fn from_chrono(dt: chrono::DateTime<Utc>) -> Self {
		let nanos = dt.nanosecond() / 1_000_000 * 1_000_000;
		Self(dt.with_nanosecond(nanos).unwrap_or(dt))
	}

	/// Milliseconds since the Unix epoch.
	pub fn timestamp_millis(&self) -> i64 {
		self.0.timestamp_millis()
	}

	/// Underlying chrono value.
	pub fn to_chrono(&self) -> chrono::DateTime<Utc> {
		self.0
	}

	/// `YYYY-MM-DDTHH:MM:SS.mmmZ`.
	pub fn to_rfc3339(&self) -> String {
		self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
	}

	/// Parses RFC 3339 (any offset) or a bare `YYYY-MM-DD` date at UTC midnight.
	pub fn parse(s: &str) -> Option<Self> {
		if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
			return Some(Self::from_chrono(dt.with_timezone(&Utc)));
		}
		let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
		let midnight = date.and_hms_opt(0, 0, 0)?;
		Some(Self(Utc.from_utc_datetime(&midnight)))
	}
}

impl From<chrono::DateTime<Utc>> for DateTime {
	fn from(dt: chrono::DateTime<Utc>) -> Self {
		Self::from_chrono(dt)
	}
}

impl fmt::Debug for DateTime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "DateTime({})", self.to_rfc3339())
	}
}

impl fmt::Display for DateTime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_rfc3339())
	}
}

/// A document value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
	/// Explicit null.
	#[default]
	Null,
	/// Boolean.
	Bool(bool),
	/// Integral number.
	Int(i64),
	/// Floating point number.
	Double(f64),
	/// UTF-8 string.
	String(String),
	/// Ordered array.
	Array(Vec<Value>),
	/// Nested document.
	Document(Document),
	/// Identifier.
	ObjectId(ObjectId),
	/// Timestamp.
	DateTime(DateTime),
}

impl Value {
	/// Short type name used in error messages.
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Bool(_) => "bool",
			Value::Int(_) => "int",
			Value::Double(_) => "double",
			Value::String(_) => "string",
			Value::Array(_) => "array",
			Value::Document(_) => "document",
			Value::ObjectId(_) => "objectId",
			Value::DateTime(_) => "date",
		}
	}

	/// Returns true for [`Value::Null`].
	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	/// Boolean view.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(b) => Some(*b),
			_ => None,
		}
	}

	/// String view.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			_ => None,
		}
	}

	/// Integral view. Doubles with no fractional part qualify.
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Value::Int(i) => Some(*i),
			Value::Double(d) if d.fract() == 0.0 && d.is_finite() && d.abs() < 9.0e18 => Some(*d as i64),
			_ => None,
		}
	}

	/// Numeric view of either number variant.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Value::Int(i) => Some(*i as f64),
			Value::Double(d) => Some(*d),
			_ => None,
		}
	}

	/// Returns true for either number variant.
	pub fn is_number(&self) -> bool {
		matches!(self, Value::Int(_) | Value::Double(_))
	}

	/// Array view.
	pub fn as_array(&self) -> Option<&Vec<Value>> {
		match self {
			Value::Array(items) => Some(items),
			_ => None,
		}
	}

	/// Document view.
	pub fn as_document(&self) -> Option<&Document> {
		match self {
			Value::Document(doc) => Some(doc),
			_ => None,
		}
	}

	/// Mutable document view.
	pub fn as_document_mut(&mut self) -> Option<&mut Document> {
		match self {
			Value::Document(doc) => Some(doc),
			_ => None,
		}
	}

	/// Consumes the value into its document, if it is one.
	pub fn into_document(self) -> Option<Document> {
		match self {
			Value::Document(doc) => Some(doc),
			_ => None,
		}
	}

	/// Truthiness used by `$exists`-style and boolean option checks.
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Null => false,
			Value::Bool(b) => *b,
			Value::Int(i) => *i != 0,
			Value::Double(d) => *d != 0.0 && !d.is_nan(),
			_ => true,
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Value::Int(i64::from(v))
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int(v)
	}
}

impl From<u32> for Value {
	fn from(v: u32) -> Self {
		Value::Int(i64::from(v))
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Double(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(v)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(v: Vec<T>) -> Self {
		Value::Array(v.into_iter().map(Into::into).collect())
	}
}

impl From<Document> for Value {
	fn from(v: Document) -> Self {
		Value::Document(v)
	}
}

impl From<ObjectId> for Value {
	fn from(v: ObjectId) -> Self {
		Value::ObjectId(v)
	}
}

impl From<DateTime> for Value {
	fn from(v: DateTime) -> Self {
		Value::DateTime(v)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map_or(Value::Null, Into::into)
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		crate::codec::serialize(self).serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for Value {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let json = serde_json::Value::deserialize(deserializer)?;
		Ok(crate::codec::deserialize(&json))
	}
}

/// Builds a [`Document`] from `key => value` pairs.
///
/// ```
/// use docshard_rpc::{doc, Value};
///
/// let d = doc! { "name" => "ada", "age" => 36, "tags" => vec!["x", "y"] };
/// assert_eq!(d.get("age"), Some(&Value::Int(36)));
/// ```
#[macro_export]
macro_rules! doc {
	() => {
		$crate::Document::new()
	};
	($($key:expr => $value:expr),+ $(,)?) => {{
		let mut doc = $crate::Document::new();
		$(doc.insert(::std::string::String::from($key), $crate::Value::from($value));)+
		doc
	}};
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn datetime_truncates_to_millis() {
		let raw = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap().with_nanosecond(123_456_789).unwrap();
		let dt = DateTime::from(raw);
		assert_eq!(dt.to_rfc3339(), "2024-02-29T12:30:00.123Z");
		assert_eq!(DateTime::parse(&dt.to_rfc3339()), Some(dt));
	}

	#[test]
	fn datetime_parses_offsets_and_bare_dates() {
		let offset = DateTime::parse("2024-01-01T02:00:00+02:00").unwrap();
		assert_eq!(offset, DateTime::parse("2024-01-01").unwrap());
		assert_eq!(DateTime::parse("yesterday"), None);
	}

	#[test]
	fn doc_macro_nests() {
		let d = doc! { "a" => doc! { "b" => 1 }, "none" => None::<i64> };
		assert_eq!(d.get("a").and_then(Value::as_document).and_then(|a| a.get("b")), Some(&Value::Int(1)));
		assert_eq!(d.get("none"), Some(&Value::Null));
		assert_eq!(d.keys().collect::<Vec<_>>(), vec!["a", "none"]);
	}
}
