//! Aggregation expressions.
//!
//! Supported: `"$field.path"` references, `"$$ROOT"`, literals, object and
//! array expressions, and the operators `$literal $add $subtract $multiply
//! $divide $concat $ifNull $size $cond $eq $ne $gt $gte $lt $lte $toUpper
//! $toLower`.

use std::cmp::Ordering;

use docshard_rpc::{DateTime, Document, Value};

use super::compare::{compare, equals};
use crate::error::codes;
use crate::{Result, StoreError};

/// Evaluates `expr` against `doc`. A field reference to a missing path yields `None`.
pub(crate) fn eval(doc: &Document, expr: &Value) -> Result<Option<Value>> {
	match expr {
		Value::String(s) if s == "$$ROOT" || s == "$$CURRENT" => Ok(Some(Value::Document(doc.clone()))),
		Value::String(s) if s.starts_with("$$") => Err(bad_expr(format!("undefined variable: {s}"))),
		Value::String(s) if s.starts_with('$') => Ok(field_ref(doc, &s[1..])),
		Value::Array(items) => items.iter().map(|item| eval_or_null(doc, item)).collect::<Result<Vec<_>>>().map(|v| Some(Value::Array(v))),
		Value::Document(spec) => match spec.iter().next() {
			Some((op, arg)) if spec.len() == 1 && op.starts_with('$') => operator(doc, op, arg).map(Some),
			_ => {
				let mut out = Document::new();
				for (key, sub) in spec {
					if let Some(value) = eval(doc, sub)? {
						out.insert(key.clone(), value);
					}
				}
				Ok(Some(Value::Document(out)))
			}
		},
		literal => Ok(Some(literal.clone())),
	}
}

/// As [`eval`], with missing mapped to null.
pub(crate) fn eval_or_null(doc: &Document, expr: &Value) -> Result<Value> {
	Ok(eval(doc, expr)?.unwrap_or(Value::Null))
}

/// Field reference with array fan-out: `"$items.sku"` over an array of
/// documents yields the array of their `sku` values.
fn field_ref(doc: &Document, path: &str) -> Option<Value> {
	let mut parts = path.split('.');
	let mut current = doc.get(parts.next()?)?.clone();
	for part in parts {
		current = match current {
			Value::Document(mut inner) => inner.shift_remove(part)?,
			Value::Array(items) => Value::Array(
				items
					.into_iter()
					.filter_map(|item| match item {
						Value::Document(mut inner) => inner.shift_remove(part),
						_ => None,
					})
					.collect(),
			),
			_ => return None,
		};
	}
	Some(current)
}

fn operator(doc: &Document, op: &str, arg: &Value) -> Result<Value> {
	match (op, arg) {
		("$literal", _) => return Ok(arg.clone()),
		("$cond", Value::Document(_)) => return cond(doc, arg, &[]),
		_ => {}
	}
	let args = match arg {
		Value::Array(items) => items.iter().map(|item| eval_or_null(doc, item)).collect::<Result<Vec<_>>>()?,
		other => vec![eval_or_null(doc, other)?],
	};
	match op {
		"$add" => arithmetic(op, &args, |a, b| a.checked_add(b), |a, b| a + b, true),
		"$multiply" => arithmetic(op, &args, |a, b| a.checked_mul(b), |a, b| a * b, false),
		"$subtract" => {
			let [a, b] = two(op, &args)?;
			if let (Value::DateTime(x), Value::DateTime(y)) = (a, b) {
				return Ok(Value::Int(x.timestamp_millis() - y.timestamp_millis()));
			}
			arithmetic(op, &[a.clone(), b.clone()], |a, b| a.checked_sub(b), |a, b| a - b, true)
		}
		"$divide" => {
			let [a, b] = two(op, &args)?;
			if a.is_null() || b.is_null() {
				return Ok(Value::Null);
			}
			let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
				return Err(bad_expr("$divide only supports numeric types"));
			};
			if y == 0.0 {
				return Err(bad_expr("can't $divide by zero"));
			}
			Ok(Value::Double(x / y))
		}
		"$concat" => {
			let mut out = String::new();
			for arg in &args {
				match arg {
					Value::Null => return Ok(Value::Null),
					Value::String(s) => out.push_str(s),
					other => return Err(bad_expr(format!("$concat only supports strings, not {}", other.type_name()))),
				}
			}
			Ok(Value::String(out))
		}
		"$ifNull" => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
		"$size" => match args.as_slice() {
			[Value::Array(items)] => Ok(Value::Int(items.len() as i64)),
			_ => Err(bad_expr("the argument to $size must be an array")),
		},
		"$cond" => cond(doc, arg, &args),
		"$eq" => two(op, &args).map(|[a, b]| Value::Bool(equals(a, b))),
		"$ne" => two(op, &args).map(|[a, b]| Value::Bool(!equals(a, b))),
		"$gt" => two(op, &args).map(|[a, b]| Value::Bool(compare(a, b) == Ordering::Greater)),
		"$gte" => two(op, &args).map(|[a, b]| Value::Bool(compare(a, b) != Ordering::Less)),
		"$lt" => two(op, &args).map(|[a, b]| Value::Bool(compare(a, b) == Ordering::Less)),
		"$lte" => two(op, &args).map(|[a, b]| Value::Bool(compare(a, b) != Ordering::Greater)),
		"$toUpper" | "$toLower" => {
			let s = match args.first() {
				Some(Value::String(s)) => s.clone(),
				Some(Value::Null) | None => String::new(),
				Some(Value::Int(i)) => i.to_string(),
				Some(Value::Double(d)) => d.to_string(),
				Some(Value::DateTime(dt)) => dt.to_rfc3339(),
				Some(other) => return Err(bad_expr(format!("can't convert {} to string", other.type_name()))),
			};
			Ok(Value::String(if op == "$toUpper" { s.to_uppercase() } else { s.to_lowercase() }))
		}
		other => Err(bad_expr(format!("unrecognized expression '{other}'"))),
	}
}

fn cond(doc: &Document, raw: &Value, args: &[Value]) -> Result<Value> {
	if let Value::Document(spec) = raw {
		let get = |key: &str| spec.get(key).ok_or_else(|| bad_expr(format!("missing '{key}' parameter to $cond")));
		let test = eval_or_null(doc, get("if")?)?;
		let branch = if test.is_truthy() { get("then")? } else { get("else")? };
		return eval_or_null(doc, branch);
	}
	match args {
		[test, then, otherwise] => Ok(if test.is_truthy() { then.clone() } else { otherwise.clone() }),
		_ => Err(bad_expr("$cond needs 3 arguments")),
	}
}

fn two<'a>(op: &str, args: &'a [Value]) -> Result<[&'a Value; 2]> {
	match args {
		[a, b] => Ok([a, b]),
		_ => Err(bad_expr(format!("expression {op} takes exactly 2 arguments"))),
	}
}

fn arithmetic(op: &str, args: &[Value], int: fn(i64, i64) -> Option<i64>, float: fn(f64, f64) -> f64, allow_date: bool) -> Result<Value> {
	let mut acc: Option<Value> = None;
	let mut date = false;
	for arg in args {
		let arg = match arg {
			Value::Null => return Ok(Value::Null),
			Value::DateTime(dt) if allow_date && !date => {
				date = true;
				Value::Int(dt.timestamp_millis())
			}
			v if v.is_number() => v.clone(),
			other => return Err(bad_expr(format!("{op} only supports numeric types, not {}", other.type_name()))),
		};
		acc = Some(match acc {
			None => arg,
			Some(prev) => numeric(&prev, &arg, int, float),
		});
	}
	let result = acc.unwrap_or(Value::Int(0));
	if date {
		return Ok(result.as_f64().and_then(|ms| DateTime::from_millis(ms as i64)).map_or(Value::Null, Value::DateTime));
	}
	Ok(result)
}

/// Int op Int stays Int unless it overflows; anything involving a double is a double.
pub(crate) fn numeric(a: &Value, b: &Value, int: fn(i64, i64) -> Option<i64>, float: fn(f64, f64) -> f64) -> Value {
	if let (Value::Int(x), Value::Int(y)) = (a, b)
		&& let Some(r) = int(*x, *y)
	{
		return Value::Int(r);
	}
	Value::Double(float(a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0)))
}

fn bad_expr(message: impl Into<String>) -> StoreError {
	StoreError::operation(codes::BAD_VALUE, message)
}

#[cfg(test)]
mod tests {
	use docshard_rpc::doc;
	use pretty_assertions::assert_eq;

	use super::*;

	fn order() -> Document {
		doc! { "qty" => 3, "price" => 2.5, "name" => "Widget", "items" => vec![doc! { "sku" => "a" }, doc! { "sku" => "b" }] }
	}

	#[test]
	fn arithmetic_keeps_ints_when_it_can() {
		let d = order();
		assert_eq!(eval_or_null(&d, &Value::from(doc! { "$add" => vec![Value::from("$qty"), Value::Int(1)] })).unwrap(), Value::Int(4));
		assert_eq!(
			eval_or_null(&d, &Value::from(doc! { "$multiply" => vec!["$qty", "$price"] })).unwrap(),
			Value::Double(7.5)
		);
		assert_eq!(eval_or_null(&d, &Value::from(doc! { "$add" => vec![Value::from("$ghost"), Value::Int(1)] })).unwrap(), Value::Null);
	}

	#[test]
	fn references_fan_out_and_objects_nest() {
		let d = order();
		assert_eq!(eval(&d, &Value::from("$items.sku")).unwrap(), Some(Value::from(vec!["a", "b"])));
		assert_eq!(eval(&d, &Value::from("$ghost")).unwrap(), None);
		let shaped = eval_or_null(&d, &Value::from(doc! { "label" => doc! { "$toUpper" => "$name" }, "n" => doc! { "$size" => "$items" } })).unwrap();
		assert_eq!(shaped, Value::from(doc! { "label" => "WIDGET", "n" => 2 }));
	}

	#[test]
	fn cond_takes_either_form() {
		let d = order();
		let named = doc! { "$cond" => doc! { "if" => doc! { "$gte" => vec![Value::from("$qty"), Value::Int(3)] }, "then" => "bulk", "else" => "single" } };
		assert_eq!(eval_or_null(&d, &Value::from(named)).unwrap(), Value::from("bulk"));
		let positional = doc! { "$cond" => vec![Value::Bool(false), Value::Int(1), Value::Int(2)] };
		assert_eq!(eval_or_null(&d, &Value::from(positional)).unwrap(), Value::Int(2));
	}
}
