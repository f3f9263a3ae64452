//! Aggregation pipeline stages.

use docshard_rpc::{Document, Value};

use super::compare::equals;
use super::expr::{eval, eval_or_null, numeric};
use super::{compare, filter, path, projection, sort};
use crate::error::codes;
use crate::{Result, StoreError};

/// Where `$lookup` reads from and `$out` writes to.
pub(crate) trait Catalog {
	/// Snapshot of a collection; unknown collections are empty.
	fn documents(&self, collection: &str) -> Vec<Document>;
	/// Replaces a collection's contents.
	fn replace_all(&mut self, collection: &str, documents: Vec<Document>);
}

/// Runs `pipeline` over `input`.
pub(crate) fn run(mut docs: Vec<Document>, pipeline: &[Document], catalog: &mut dyn Catalog) -> Result<Vec<Document>> {
	for (index, stage) in pipeline.iter().enumerate() {
		let mut entries = stage.iter();
		let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
			return Err(stage_error(codes::BAD_VALUE, "a pipeline stage specification object must contain exactly one field"));
		};
		docs = match name.as_str() {
			"$match" => {
				let cond = spec.as_document().ok_or_else(|| stage_error(codes::BAD_VALUE, "$match needs an object"))?;
				let mut kept = Vec::with_capacity(docs.len());
				for doc in docs {
					if filter::matches(&doc, cond)? {
						kept.push(doc);
					}
				}
				kept
			}
			"$sort" => {
				let spec = spec.as_document().ok_or_else(|| stage_error(codes::BAD_VALUE, "$sort needs an object"))?;
				sort::sort(&mut docs, spec)?;
				docs
			}
			"$skip" => {
				let n = non_negative(name, spec)?;
				docs.into_iter().skip(n).collect()
			}
			"$limit" => {
				let n = non_negative(name, spec)?;
				if n == 0 {
					return Err(stage_error(15958, "the limit must be positive"));
				}
				docs.truncate(n);
				docs
			}
			"$project" => {
				let spec = spec.as_document().ok_or_else(|| stage_error(codes::BAD_VALUE, "$project needs an object"))?;
				docs.iter().map(|doc| projection::project(doc, spec)).collect::<Result<_>>()?
			}
			"$addFields" | "$set" => {
				let spec = spec.as_document().ok_or_else(|| stage_error(codes::BAD_VALUE, format!("{name} needs an object")))?;
				let mut out = Vec::with_capacity(docs.len());
				for mut doc in docs {
					let source = doc.clone();
					for (field, expression) in spec {
						match eval(&source, expression)? {
							Some(value) => {
								path::set(&mut doc, field, value)?;
							}
							None => {
								path::remove(&mut doc, field);
							}
						}
					}
					out.push(doc);
				}
				out
			}
			"$unset" => {
				let fields: Vec<&str> = match spec {
					Value::String(field) => vec![field.as_str()],
					Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
					_ => return Err(stage_error(codes::BAD_VALUE, "$unset needs a string or an array of strings")),
				};
				for doc in &mut docs {
					for field in &fields {
						path::remove(doc, field);
					}
				}
				docs
			}
			"$unwind" => unwind(docs, spec)?,
			"$group" => group(docs, spec)?,
			"$count" => {
				let field = spec.as_str().filter(|f| !f.is_empty() && !f.starts_with('$')).ok_or_else(|| stage_error(codes::BAD_VALUE, "$count needs a field name"))?;
				if docs.is_empty() {
					Vec::new()
				} else {
					let mut out = Document::new();
					out.insert(field.to_string(), Value::Int(docs.len() as i64));
					vec![out]
				}
			}
			"$lookup" => lookup(docs, spec, catalog)?,
			"$out" => {
				if index + 1 != pipeline.len() {
					return Err(stage_error(40601, "$out can only be the final stage in the pipeline"));
				}
				let target = match spec {
					Value::String(coll) => coll.clone(),
					Value::Document(d) => d.get("coll").and_then(Value::as_str).map(str::to_string).ok_or_else(|| stage_error(codes::BAD_VALUE, "$out needs 'coll'"))?,
					_ => return Err(stage_error(codes::BAD_VALUE, "$out needs a collection name")),
				};
				catalog.replace_all(&target, docs);
				Vec::new()
			}
			other => return Err(stage_error(codes::UNRECOGNIZED_STAGE, format!("unrecognized pipeline stage name: '{other}'"))),
		};
	}
	Ok(docs)
}

fn stage_error(code: i32, message: impl Into<String>) -> StoreError {
	StoreError::operation(code, message)
}

fn non_negative(stage: &str, spec: &Value) -> Result<usize> {
	spec.as_i64()
		.filter(|n| *n >= 0)
		.map(|n| n as usize)
		.ok_or_else(|| stage_error(codes::BAD_VALUE, format!("{stage} needs a non-negative integer")))
}

fn field_path(spec: &Value, what: &str) -> Result<String> {
	spec.as_str()
		.and_then(|s| s.strip_prefix('$'))
		.filter(|s| !s.is_empty())
		.map(str::to_string)
		.ok_or_else(|| stage_error(codes::BAD_VALUE, format!("{what} must be a field path starting with '$'")))
}

fn unwind(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
	let (field, preserve, index_field) = match spec {
		Value::String(_) => (field_path(spec, "$unwind")?, false, None),
		Value::Document(opts) => (
			field_path(opts.get("path").unwrap_or(&Value::Null), "$unwind path")?,
			opts.get("preserveNullAndEmptyArrays").is_some_and(Value::is_truthy),
			opts.get("includeArrayIndex").and_then(Value::as_str).map(str::to_string),
		),
		_ => return Err(stage_error(codes::BAD_VALUE, "$unwind needs a path")),
	};

	let mut out = Vec::new();
	for doc in docs {
		match path::get(&doc, &field).cloned() {
			Some(Value::Array(items)) if !items.is_empty() => {
				for (i, item) in items.into_iter().enumerate() {
					let mut copy = doc.clone();
					path::set(&mut copy, &field, item)?;
					if let Some(index_field) = &index_field {
						path::set(&mut copy, index_field, Value::Int(i as i64))?;
					}
					out.push(copy);
				}
			}
			Some(Value::Array(_)) | Some(Value::Null) | None => {
				if preserve {
					let mut copy = doc;
					if let Some(index_field) = &index_field {
						path::set(&mut copy, index_field, Value::Null)?;
					}
					out.push(copy);
				}
			}
			Some(_) => {
				let mut copy = doc;
				if let Some(index_field) = &index_field {
					path::set(&mut copy, index_field, Value::Null)?;
				}
				out.push(copy);
			}
		}
	}
	Ok(out)
}

enum Accumulator {
	Sum(Value),
	Avg { total: f64, count: u64 },
	Min(Option<Value>),
	Max(Option<Value>),
	First(Option<Value>),
	Last(Value),
	Push(Vec<Value>),
	AddToSet(Vec<Value>),
	Count(i64),
}

impl Accumulator {
	fn new(op: &str) -> Result<Self> {
		Ok(match op {
			"$sum" => Accumulator::Sum(Value::Int(0)),
			"$avg" => Accumulator::Avg { total: 0.0, count: 0 },
			"$min" => Accumulator::Min(None),
			"$max" => Accumulator::Max(None),
			"$first" => Accumulator::First(None),
			"$last" => Accumulator::Last(Value::Null),
			"$push" => Accumulator::Push(Vec::new()),
			"$addToSet" => Accumulator::AddToSet(Vec::new()),
			"$count" => Accumulator::Count(0),
			other => return Err(stage_error(15952, format!("unknown group operator '{other}'"))),
		})
	}

	fn feed(&mut self, value: Value) {
		match self {
			Accumulator::Sum(total) => {
				if value.is_number() {
					*total = numeric(total, &value, i64::checked_add, |a, b| a + b);
				}
			}
			Accumulator::Avg { total, count } => {
				if let Some(v) = value.as_f64().filter(|_| value.is_number()) {
					*total += v;
					*count += 1;
				}
			}
			Accumulator::Min(best) => {
				if !value.is_null() && best.as_ref().is_none_or(|b| compare::compare(&value, b).is_lt()) {
					*best = Some(value);
				}
			}
			Accumulator::Max(best) => {
				if !value.is_null() && best.as_ref().is_none_or(|b| compare::compare(&value, b).is_gt()) {
					*best = Some(value);
				}
			}
			Accumulator::First(first) => {
				if first.is_none() {
					*first = Some(value);
				}
			}
			Accumulator::Last(last) => *last = value,
			Accumulator::Push(items) => items.push(value),
			Accumulator::AddToSet(items) => {
				if !items.iter().any(|existing| equals(existing, &value)) {
					items.push(value);
				}
			}
			Accumulator::Count(n) => *n += 1,
		}
	}

	fn finish(self) -> Value {
		match self {
			Accumulator::Sum(total) => total,
			Accumulator::Avg { count: 0, .. } => Value::Null,
			Accumulator::Avg { total, count } => Value::Double(total / count as f64),
			Accumulator::Min(v) | Accumulator::Max(v) | Accumulator::First(v) => v.unwrap_or(Value::Null),
			Accumulator::Last(v) => v,
			Accumulator::Push(items) | Accumulator::AddToSet(items) => Value::Array(items),
			Accumulator::Count(n) => Value::Int(n),
		}
	}
}

fn group(docs: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
	let spec = spec.as_document().ok_or_else(|| stage_error(codes::BAD_VALUE, "$group needs an object"))?;
	let key_expr = spec.get("_id").ok_or_else(|| stage_error(15955, "a group specification must include an _id"))?;

	let mut fields: Vec<(&str, &str, &Value)> = Vec::new();
	for (name, acc) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
		let acc = acc.as_document().filter(|d| d.len() == 1).ok_or_else(|| stage_error(40234, format!("the field '{name}' must be an accumulator object")))?;
		let (op, expression) = acc.iter().next().ok_or_else(|| stage_error(40234, format!("the field '{name}' must be an accumulator object")))?;
		fields.push((name.as_str(), op.as_str(), expression));
	}

	let mut groups: Vec<(Value, Vec<Accumulator>)> = Vec::new();
	for doc in &docs {
		let key = eval_or_null(doc, key_expr)?;
		let slot = match groups.iter().position(|(k, _)| equals(k, &key)) {
			Some(slot) => slot,
			None => {
				let accs = fields.iter().map(|(_, op, _)| Accumulator::new(op)).collect::<Result<Vec<_>>>()?;
				groups.push((key, accs));
				groups.len() - 1
			}
		};
		for ((_, _, expression), acc) in fields.iter().zip(groups[slot].1.iter_mut()) {
			acc.feed(eval_or_null(doc, expression)?);
		}
	}

	Ok(groups
		.into_iter()
		.map(|(key, accs)| {
			let mut out = Document::new();
			out.insert("_id".to_string(), key);
			for ((name, _, _), acc) in fields.iter().zip(accs) {
				out.insert(name.to_string(), acc.finish());
			}
			out
		})
		.collect())
}

fn lookup(docs: Vec<Document>, spec: &Value, catalog: &dyn Catalog) -> Result<Vec<Document>> {
	let spec = spec.as_document().ok_or_else(|| stage_error(codes::BAD_VALUE, "$lookup needs an object"))?;
	let get = |key: &str| {
		spec.get(key)
			.and_then(Value::as_str)
			.ok_or_else(|| stage_error(codes::BAD_VALUE, format!("$lookup needs '{key}' (the pipeline form is not supported)")))
	};
	let (from, local, foreign, as_field) = (get("from")?, get("localField")?, get("foreignField")?, get("as")?);
	let foreign_docs = catalog.documents(from);

	let mut out = Vec::with_capacity(docs.len());
	for mut doc in docs {
		let locals: Vec<Value> = match path::get_all(&doc, local).as_slice() {
			[] => vec![Value::Null],
			values => values.iter().flat_map(|v| v.as_array().cloned().unwrap_or_else(|| vec![(*v).clone()])).collect(),
		};
		let joined: Vec<Value> = foreign_docs
			.iter()
			.filter(|candidate| {
				let theirs = path::get_all(candidate, foreign);
				locals.iter().any(|mine| {
					if theirs.is_empty() {
						return mine.is_null();
					}
					theirs.iter().any(|t| equals(t, mine) || t.as_array().is_some_and(|items| items.iter().any(|i| equals(i, mine))))
				})
			})
			.cloned()
			.map(Value::Document)
			.collect();
		path::set(&mut doc, as_field, Value::Array(joined))?;
		out.push(doc);
	}
	Ok(out)
}
