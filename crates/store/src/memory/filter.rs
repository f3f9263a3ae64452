//! Query filter evaluation.

use std::cmp::Ordering;

use docshard_rpc::{Document, Value};

use super::compare::{comparable, compare, equals};
use super::path;
use crate::error::codes;
use crate::{Result, StoreError};

/// Whether `doc` satisfies `filter`. An empty filter matches everything.
pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool> {
	for (key, cond) in filter {
		let ok = match key.as_str() {
			"$and" => clauses(key, cond)?.iter().try_fold(true, |acc, c| Ok::<_, StoreError>(acc && matches(doc, c)?))?,
			"$or" => {
				let mut any = false;
				for c in clauses(key, cond)? {
					if matches(doc, c)? {
						any = true;
						break;
					}
				}
				any
			}
			"$nor" => {
				let mut none = true;
				for c in clauses(key, cond)? {
					if matches(doc, c)? {
						none = false;
						break;
					}
				}
				none
			}
			op if op.starts_with('$') => return Err(bad_value(format!("unknown top level operator: {op}"))),
			field => field_matches(&path::get_all(doc, field), cond)?,
		};
		if !ok {
			return Ok(false);
		}
	}
	Ok(true)
}

fn clauses<'a>(key: &str, cond: &'a Value) -> Result<Vec<&'a Document>> {
	let items = cond.as_array().filter(|items| !items.is_empty()).ok_or_else(|| bad_value(format!("{key} must be a nonempty array")))?;
	items.iter().map(|item| item.as_document().ok_or_else(|| bad_value(format!("{key} entries must be objects")))).collect()
}

fn is_operator_doc(cond: &Value) -> Option<&Document> {
	cond.as_document().filter(|doc| doc.keys().next().is_some_and(|k| k.starts_with('$')))
}

fn field_matches(candidates: &[&Value], cond: &Value) -> Result<bool> {
	let Some(ops) = is_operator_doc(cond) else {
		return Ok(eq_match(candidates, cond));
	};
	for (op, arg) in ops {
		if !operator_matches(candidates, op, arg)? {
			return Ok(false);
		}
	}
	Ok(true)
}

/// Each candidate matches directly or through one of its array elements.
fn any_element(candidates: &[&Value], mut pred: impl FnMut(&Value) -> bool) -> bool {
	candidates.iter().copied().any(|candidate| pred(candidate) || candidate.as_array().is_some_and(|items| items.iter().any(&mut pred)))
}

fn eq_match(candidates: &[&Value], target: &Value) -> bool {
	if candidates.is_empty() {
		return target.is_null();
	}
	any_element(candidates, |v| equals(v, target))
}

fn range_match(candidates: &[&Value], target: &Value, accept: fn(Ordering) -> bool) -> bool {
	any_element(candidates, |v| comparable(v, target) && accept(compare(v, target)))
}

fn operator_matches(candidates: &[&Value], op: &str, arg: &Value) -> Result<bool> {
	Ok(match op {
		"$eq" => eq_match(candidates, arg),
		"$ne" => !eq_match(candidates, arg),
		"$gt" => range_match(candidates, arg, Ordering::is_gt),
		"$gte" => range_match(candidates, arg, Ordering::is_ge),
		"$lt" => range_match(candidates, arg, Ordering::is_lt),
		"$lte" => range_match(candidates, arg, Ordering::is_le),
		"$in" => in_list(candidates, op, arg)?,
		"$nin" => !in_list(candidates, op, arg)?,
		"$exists" => !candidates.is_empty() == arg.is_truthy(),
		"$not" => match arg {
			Value::Document(_) => !field_matches(candidates, arg)?,
			_ => return Err(bad_value("$not needs a document")),
		},
		"$size" => {
			let size = arg.as_i64().filter(|n| *n >= 0).ok_or_else(|| bad_value("$size needs a non-negative integer"))?;
			candidates.iter().any(|c| c.as_array().is_some_and(|items| items.len() as i64 == size))
		}
		"$all" => {
			let wanted = arg.as_array().ok_or_else(|| bad_value("$all needs an array"))?;
			!wanted.is_empty() && wanted.iter().all(|w| eq_match(candidates, w))
		}
		"$elemMatch" => {
			let sub = arg.as_document().ok_or_else(|| bad_value("$elemMatch needs an object"))?;
			let mut hit = false;
			for items in candidates.iter().filter_map(|c| c.as_array()) {
				for item in items {
					let ok = match item {
						Value::Document(d) if is_operator_doc(arg).is_none() => matches(d, sub)?,
						other => field_matches(&[other], arg)?,
					};
					if ok {
						hit = true;
						break;
					}
				}
			}
			hit
		}
		other => return Err(bad_value(format!("unknown operator: {other}"))),
	})
}

fn in_list(candidates: &[&Value], op: &str, arg: &Value) -> Result<bool> {
	let list = arg.as_array().ok_or_else(|| bad_value(format!("{op} needs an array")))?;
	Ok(list.iter().any(|target| eq_match(candidates, target)))
}

fn bad_value(message: impl Into<String>) -> StoreError {
	StoreError::operation(codes::BAD_VALUE, message)
}

/// Equality fields of `filter` that seed an upserted document.
pub(crate) fn upsert_seed(filter: &Document) -> Result<Document> {
	let mut seed = Document::new();
	seed_into(&mut seed, filter)?;
	Ok(seed)
}

fn seed_into(seed: &mut Document, filter: &Document) -> Result<()> {
	for (key, cond) in filter {
		if key == "$and" {
			for clause in clauses(key, cond)? {
				seed_into(seed, clause)?;
			}
			continue;
		}
		if key.starts_with('$') {
			continue;
		}
		match is_operator_doc(cond) {
			Some(ops) => {
				if let Some(value) = ops.get("$eq") {
					path::set(seed, key, value.clone())?;
				}
			}
			None => {
				path::set(seed, key, cond.clone())?;
			}
		}
	}
	Ok(())
}
