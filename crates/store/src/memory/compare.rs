//! Cross-type value ordering and equality.

use std::cmp::Ordering;

use docshard_rpc::Value;

/// Canonical type bracket: null < numbers < strings < documents < arrays <
/// ids < bools < dates.
fn rank(value: &Value) -> u8 {
	match value {
		Value::Null => 1,
		Value::Int(_) | Value::Double(_) => 2,
		Value::String(_) => 3,
		Value::Document(_) => 4,
		Value::Array(_) => 5,
		Value::ObjectId(_) => 7,
		Value::Bool(_) => 8,
		Value::DateTime(_) => 9,
	}
}

/// Total order used by sorts, `$min`/`$max` and range operators.
pub(crate) fn compare(a: &Value, b: &Value) -> Ordering {
	match (a, b) {
		(Value::Int(x), Value::Int(y)) => x.cmp(y),
		(x, y) if x.is_number() && y.is_number() => {
			let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
			x.partial_cmp(&y).unwrap_or_else(|| x.is_nan().cmp(&y.is_nan()).reverse())
		}
		(Value::String(x), Value::String(y)) => x.cmp(y),
		(Value::Document(x), Value::Document(y)) => {
			for ((xk, xv), (yk, yv)) in x.iter().zip(y.iter()) {
				let ord = compare(xv, yv).then_with(|| xk.cmp(yk));
				if ord != Ordering::Equal {
					return ord;
				}
			}
			x.len().cmp(&y.len())
		}
		(Value::Array(x), Value::Array(y)) => {
			for (xv, yv) in x.iter().zip(y.iter()) {
				let ord = compare(xv, yv);
				if ord != Ordering::Equal {
					return ord;
				}
			}
			x.len().cmp(&y.len())
		}
		(Value::ObjectId(x), Value::ObjectId(y)) => x.cmp(y),
		(Value::Bool(x), Value::Bool(y)) => x.cmp(y),
		(Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
		_ => rank(a).cmp(&rank(b)),
	}
}

/// Query equality: numbers compare by value across `Int`/`Double`.
pub(crate) fn equals(a: &Value, b: &Value) -> bool {
	rank(a) == rank(b) && compare(a, b) == Ordering::Equal
}

/// Same type bracket, so range operators may compare the two.
pub(crate) fn comparable(a: &Value, b: &Value) -> bool {
	rank(a) == rank(b)
}
