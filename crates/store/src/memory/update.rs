//! Update operators and replacement documents.

use std::cmp::Ordering;

use docshard_rpc::{Document, Value};

use super::compare::{compare, equals};
use super::expr::numeric;
use super::{filter, path};
use crate::error::codes;
use crate::{Result, StoreError};

/// Applies an operator update in place. `inserting` enables `$setOnInsert`.
/// Returns whether the document changed.
pub(crate) fn apply(doc: &mut Document, update: &Document, inserting: bool) -> Result<bool> {
	if update.is_empty() {
		return Err(StoreError::operation(codes::FAILED_TO_PARSE, "update document must not be empty"));
	}
	if let Some(key) = update.keys().find(|k| !k.starts_with('$')) {
		return Err(StoreError::InvalidArgument(format!("update document requires atomic operators, found field '{key}'")));
	}

	let before = doc.clone();
	for (op, fields) in update {
		let fields = fields
			.as_document()
			.ok_or_else(|| StoreError::operation(codes::FAILED_TO_PARSE, format!("modifier {op} expects an object")))?;
		for (field, arg) in fields {
			match op.as_str() {
				"$set" => set(doc, field, arg.clone())?,
				"$setOnInsert" if inserting => set(doc, field, arg.clone())?,
				"$setOnInsert" => {}
				"$unset" => {
					guard_id(field)?;
					path::remove(doc, field);
				}
				"$inc" => arith(doc, op, field, arg, |a, b| a.checked_add(b), |a, b| a + b, arg.clone())?,
				"$mul" => arith(doc, op, field, arg, |a, b| a.checked_mul(b), |a, b| a * b, zero_like(arg))?,
				"$min" => extreme(doc, field, arg, Ordering::Less)?,
				"$max" => extreme(doc, field, arg, Ordering::Greater)?,
				"$push" => push(doc, op, field, arg, false)?,
				"$addToSet" => push(doc, op, field, arg, true)?,
				"$pull" => pull(doc, field, arg)?,
				other => return Err(StoreError::operation(codes::FAILED_TO_PARSE, format!("unknown modifier: {other}"))),
			}
		}
	}
	Ok(*doc != before || doc.keys().ne(before.keys()))
}

/// Replaces `doc` by `replacement`, keeping its `_id`.
pub(crate) fn replace(doc: &mut Document, replacement: &Document) -> Result<bool> {
	if let Some(key) = replacement.keys().find(|k| k.starts_with('$')) {
		return Err(StoreError::InvalidArgument(format!("replacement document must not contain update operators, found '{key}'")));
	}
	let id = doc.get("_id").cloned();
	if let (Some(old), Some(new)) = (&id, replacement.get("_id"))
		&& !equals(old, new)
	{
		return Err(immutable_id());
	}
	let mut next = replacement.clone();
	if let Some(id) = id {
		next.shift_remove("_id");
		next.shift_insert(0, "_id".to_string(), id);
	}
	let changed = next != *doc;
	*doc = next;
	Ok(changed)
}

/// Builds the document an upsert inserts: filter equalities, then the update
/// or replacement on top.
pub(crate) fn upsert_document(filter_doc: &Document, update: Upsert<'_>) -> Result<Document> {
	let mut doc = match update {
		Upsert::Operators(update) => {
			let mut seed = filter::upsert_seed(filter_doc)?;
			apply(&mut seed, update, true)?;
			seed
		}
		Upsert::Replacement(replacement) => {
			if let Some(key) = replacement.keys().find(|k| k.starts_with('$')) {
				return Err(StoreError::InvalidArgument(format!("replacement document must not contain update operators, found '{key}'")));
			}
			let mut doc = replacement.clone();
			if !doc.contains_key("_id")
				&& let Some(id) = filter::upsert_seed(filter_doc)?.shift_remove("_id")
			{
				doc.shift_insert(0, "_id".to_string(), id);
			}
			doc
		}
	};
	if !doc.contains_key("_id") {
		doc.shift_insert(0, "_id".to_string(), Value::ObjectId(docshard_rpc::ObjectId::new()));
	}
	Ok(doc)
}

/// Second argument of an upserting write.
#[derive(Clone, Copy)]
pub(crate) enum Upsert<'a> {
	Operators(&'a Document),
	Replacement(&'a Document),
}

fn set(doc: &mut Document, field: &str, value: Value) -> Result<()> {
	if field == "_id" || field.starts_with("_id.") {
		match path::get(doc, field) {
			Some(current) if equals(current, &value) => return Ok(()),
			Some(_) => return Err(immutable_id()),
			None => {}
		}
	}
	path::set(doc, field, value)?;
	Ok(())
}

fn guard_id(field: &str) -> Result<()> {
	if field == "_id" || field.starts_with("_id.") {
		return Err(immutable_id());
	}
	Ok(())
}

fn immutable_id() -> StoreError {
	StoreError::operation(codes::IMMUTABLE_FIELD, "performing an update on the path '_id' would modify the immutable field '_id'")
}

fn zero_like(arg: &Value) -> Value {
	match arg {
		Value::Double(_) => Value::Double(0.0),
		_ => Value::Int(0),
	}
}

fn arith(
	doc: &mut Document,
	op: &str,
	field: &str,
	arg: &Value,
	int: fn(i64, i64) -> Option<i64>,
	float: fn(f64, f64) -> f64,
	if_missing: Value,
) -> Result<()> {
	guard_id(field)?;
	if !arg.is_number() {
		return Err(StoreError::operation(codes::TYPE_MISMATCH, format!("cannot {op} with non-numeric argument: {{{field}: {}}}", arg.type_name())));
	}
	let next = match path::get(doc, field) {
		None => if_missing,
		Some(current) if current.is_number() => numeric(current, arg, int, float),
		Some(current) => {
			return Err(StoreError::operation(
				codes::TYPE_MISMATCH,
				format!("cannot apply {op} to a value of non-numeric type {} at '{field}'", current.type_name()),
			));
		}
	};
	path::set(doc, field, next)?;
	Ok(())
}

fn extreme(doc: &mut Document, field: &str, arg: &Value, want: Ordering) -> Result<()> {
	let replace = match path::get(doc, field) {
		None => true,
		Some(current) => compare(arg, current) == want,
	};
	if replace {
		set(doc, field, arg.clone())?;
	}
	Ok(())
}

fn push(doc: &mut Document, op: &str, field: &str, arg: &Value, unique: bool) -> Result<()> {
	guard_id(field)?;
	let items: Vec<Value> = match arg.as_document().and_then(|d| d.get("$each")) {
		Some(Value::Array(each)) => each.clone(),
		Some(_) => return Err(StoreError::operation(codes::BAD_VALUE, format!("the argument to $each in {op} must be an array"))),
		None => vec![arg.clone()],
	};
	if path::get(doc, field).is_none() {
		path::set(doc, field, Value::Array(Vec::new()))?;
	}
	let Some(Value::Array(target)) = path::get_mut(doc, field) else {
		return Err(StoreError::operation(codes::TYPE_MISMATCH, format!("the field '{field}' must be an array for {op}")));
	};
	for item in items {
		if unique && target.iter().any(|existing| equals(existing, &item)) {
			continue;
		}
		target.push(item);
	}
	Ok(())
}

fn pull(doc: &mut Document, field: &str, cond: &Value) -> Result<()> {
	guard_id(field)?;
	let Some(current) = path::get_mut(doc, field) else {
		return Ok(());
	};
	let Value::Array(items) = current else {
		return Err(StoreError::operation(codes::BAD_VALUE, format!("cannot apply $pull to a non-array value at '{field}'")));
	};
	let operator_cond = cond.as_document().is_some_and(|d| d.keys().next().is_some_and(|k| k.starts_with('$')));
	let mut kept = Vec::with_capacity(items.len());
	for item in items.drain(..) {
		let remove = match (cond, &item) {
			(Value::Document(sub), Value::Document(element)) if !operator_cond => filter::matches(element, sub)?,
			(Value::Document(sub), element) if operator_cond => {
				let mut wrapper = Document::new();
				wrapper.insert("v".to_string(), element.clone());
				filter::matches(&wrapper, &Document::from_iter([("v".to_string(), Value::Document(sub.clone()))]))?
			}
			(_, element) => equals(element, cond),
		};
		if !remove {
			kept.push(item);
		}
	}
	*items = kept;
	Ok(())
}
