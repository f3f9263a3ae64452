//! Inclusion/exclusion projections, shared by `find` and `$project`.

use docshard_rpc::{Document, Value};

use super::{expr, path};
use crate::error::codes;
use crate::{Result, StoreError};

enum Field<'a> {
	Include,
	Exclude,
	Computed(&'a Value),
}

fn classify(value: &Value) -> Field<'_> {
	match value {
		Value::Bool(_) | Value::Int(_) | Value::Double(_) if value.is_truthy() => Field::Include,
		Value::Bool(_) | Value::Int(_) | Value::Double(_) => Field::Exclude,
		other => Field::Computed(other),
	}
}

/// Applies `spec` to `doc`. `_id` is kept unless excluded explicitly.
pub(crate) fn project(doc: &Document, spec: &Document) -> Result<Document> {
	let mut keep_id = true;
	let mut id_only = false;
	let mut includes: Vec<Vec<&str>> = Vec::new();
	let mut excludes: Vec<&str> = Vec::new();
	let mut computed: Vec<(&str, &Value)> = Vec::new();

	for (key, value) in spec {
		match (key.as_str(), classify(value)) {
			("_id", Field::Include) => id_only = true,
			("_id", Field::Exclude) => keep_id = false,
			(key, Field::Include) => includes.push(key.split('.').collect()),
			(key, Field::Exclude) => excludes.push(key),
			(key, Field::Computed(expr)) => computed.push((key, expr)),
		}
	}

	if !excludes.is_empty() {
		if let Some(first) = includes.first() {
			return Err(mixed(&first.join(".")));
		}
		if let Some((key, _)) = computed.first() {
			return Err(mixed(key));
		}
		let mut out = doc.clone();
		for field in excludes {
			path::remove(&mut out, field);
		}
		if !keep_id {
			out.shift_remove("_id");
		}
		return Ok(out);
	}

	if includes.is_empty() && computed.is_empty() && !id_only {
		// `{}` or `{_id: 0}` alone.
		let mut out = doc.clone();
		if !keep_id {
			out.shift_remove("_id");
		}
		return Ok(out);
	}

	if keep_id {
		includes.push(vec!["_id"]);
	}
	let mut out = include(doc, &includes);
	if keep_id && let Some(id) = out.shift_remove("_id") {
		out.shift_insert(0, "_id".to_string(), id);
	}
	for (key, expression) in computed {
		match expr::eval(doc, expression)? {
			Some(value) => {
				path::set(&mut out, key, value)?;
			}
			None => {
				path::remove(&mut out, key);
			}
		}
	}
	Ok(out)
}

fn include(doc: &Document, paths: &[Vec<&str>]) -> Document {
	let mut out = Document::new();
	for (key, value) in doc {
		let matching: Vec<&Vec<&str>> = paths.iter().filter(|p| p.first() == Some(&key.as_str())).collect();
		if matching.is_empty() {
			continue;
		}
		if matching.iter().any(|p| p.len() == 1) {
			out.insert(key.clone(), value.clone());
			continue;
		}
		let rest: Vec<Vec<&str>> = matching.iter().map(|p| p[1..].to_vec()).collect();
		match value {
			Value::Document(inner) => {
				out.insert(key.clone(), Value::Document(include(inner, &rest)));
			}
			Value::Array(items) => {
				let projected = items
					.iter()
					.filter_map(|item| item.as_document().map(|d| Value::Document(include(d, &rest))))
					.collect();
				out.insert(key.clone(), Value::Array(projected));
			}
			_ => {}
		}
	}
	out
}

fn mixed(field: &str) -> StoreError {
	StoreError::operation(codes::PROJECTION_MIX, format!("cannot do exclusion on field {field} in inclusion projection"))
}

#[cfg(test)]
mod tests {
	use docshard_rpc::doc;
	use pretty_assertions::assert_eq;

	use super::*;

	fn user() -> Document {
		doc! { "_id" => 1, "name" => "ada", "address" => doc! { "city" => "london", "zip" => "N1" }, "age" => 36 }
	}

	#[test]
	fn inclusion_keeps_id_and_document_order() {
		let out = project(&user(), &doc! { "age" => 1, "address.city" => true }).unwrap();
		assert_eq!(out, doc! { "_id" => 1, "address" => doc! { "city" => "london" }, "age" => 36 });
	}

	#[test]
	fn exclusion_removes_paths() {
		let out = project(&user(), &doc! { "_id" => 0, "address.zip" => 0, "age" => false }).unwrap();
		assert_eq!(out, doc! { "name" => "ada", "address" => doc! { "city" => "london" } });
	}

	#[test]
	fn computed_fields_count_as_inclusion() {
		let out = project(&user(), &doc! { "_id" => 0, "name" => 1, "where" => "$address.city" }).unwrap();
		assert_eq!(out, doc! { "name" => "ada", "where" => "london" });
		assert!(project(&user(), &doc! { "name" => 1, "age" => 0 }).is_err());
		assert_eq!(project(&user(), &doc! { "_id" => 1 }).unwrap(), doc! { "_id" => 1 });
	}
}
