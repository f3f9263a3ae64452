//! Sort specifications.

use std::cmp::Ordering;

use docshard_rpc::{Document, Value};

use super::compare::compare;
use super::path;
use crate::error::codes;
use crate::{Result, StoreError};

/// Stable sort by `{field: 1 | -1, ...}`. Missing fields sort as null.
pub(crate) fn sort(docs: &mut [Document], spec: &Document) -> Result<()> {
	sort_by_spec(docs, spec, |doc| doc)
}

/// [`sort`] over items that each resolve to a document.
pub(crate) fn sort_by_spec<T>(items: &mut [T], spec: &Document, doc: impl Fn(&T) -> &Document) -> Result<()> {
	let keys = spec
		.iter()
		.map(|(field, dir)| match dir.as_i64() {
			Some(1) => Ok((field.as_str(), false)),
			Some(-1) => Ok((field.as_str(), true)),
			_ => Err(StoreError::operation(15974, format!("illegal key in $sort specification: {field}: {dir:?}"))),
		})
		.collect::<Result<Vec<_>>>()?;
	if keys.is_empty() {
		return Err(StoreError::operation(codes::BAD_VALUE, "$sort stage must have at least one sort key"));
	}
	items.sort_by(|a, b| {
		let (a, b) = (doc(a), doc(b));
		for (field, descending) in &keys {
			let ord = compare(sort_key(a, field), sort_key(b, field));
			let ord = if *descending { ord.reverse() } else { ord };
			if ord != Ordering::Equal {
				return ord;
			}
		}
		Ordering::Equal
	});
	Ok(())
}

fn sort_key<'a>(doc: &'a Document, field: &str) -> &'a Value {
	const NULL: &Value = &Value::Null;
	path::get(doc, field).unwrap_or(NULL)
}

#[cfg(test)]
mod tests {
	use docshard_rpc::doc;

	use super::*;

	#[test]
	fn sorts_by_keys_in_order_with_missing_first() {
		let mut docs = vec![doc! { "a" => 2, "b" => 1 }, doc! { "a" => 1, "b" => 5 }, doc! { "b" => 9 }, doc! { "a" => 2, "b" => 3 }];
		sort(&mut docs, &doc! { "a" => 1, "b" => -1 }).unwrap();
		let bs: Vec<_> = docs.iter().filter_map(|d| d.get("b").and_then(Value::as_i64)).collect();
		assert_eq!(bs, vec![9, 5, 3, 1]);
		assert!(sort(&mut docs, &doc! { "a" => "up" }).is_err());
	}
}
