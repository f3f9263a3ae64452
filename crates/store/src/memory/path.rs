//! Dotted field paths.

use docshard_rpc::{Document, Value};

use crate::error::codes;
use crate::{Result, StoreError};

/// Single-valued lookup. Numeric segments index into arrays.
pub(crate) fn get<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
	let mut parts = path.split('.');
	let mut current = doc.get(parts.next()?)?;
	for part in parts {
		current = step(current, part)?;
	}
	Some(current)
}

fn step<'a>(value: &'a Value, part: &str) -> Option<&'a Value> {
	match value {
		Value::Document(doc) => doc.get(part),
		Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
		_ => None,
	}
}

/// Multi-valued lookup used by query matching: arrays met along the way fan
/// out over their document elements.
pub(crate) fn get_all<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
	let parts: Vec<&str> = path.split('.').collect();
	let mut out = Vec::new();
	if let Some((first, rest)) = parts.split_first()
		&& let Some(value) = doc.get(*first)
	{
		collect(value, rest, &mut out);
	}
	out
}

fn collect<'a>(value: &'a Value, rest: &[&str], out: &mut Vec<&'a Value>) {
	let Some((part, tail)) = rest.split_first() else {
		out.push(value);
		return;
	};
	match value {
		Value::Document(doc) => {
			if let Some(next) = doc.get(*part) {
				collect(next, tail, out);
			}
		}
		Value::Array(items) => {
			if let Ok(index) = part.parse::<usize>()
				&& let Some(next) = items.get(index)
			{
				collect(next, tail, out);
			}
			for item in items.iter().filter(|item| matches!(item, Value::Document(_))) {
				collect(item, rest, out);
			}
		}
		_ => {}
	}
}

/// Mutable lookup, no array fan-out.
pub(crate) fn get_mut<'a>(doc: &'a mut Document, path: &str) -> Option<&'a mut Value> {
	let mut parts = path.split('.');
	let mut current = doc.get_mut(parts.next()?)?;
	for part in parts {
		current = match current {
			Value::Document(inner) => inner.get_mut(part)?,
			Value::Array(items) => items.get_mut(part.parse::<usize>().ok()?)?,
			_ => return None,
		};
	}
	Some(current)
}

/// Most null slots one positional write may append to an array.
const MAX_PADDING: usize = 1_500_000;

/// Sets `path`, creating intermediate documents. Returns the previous value.
pub(crate) fn set(doc: &mut Document, path: &str, value: Value) -> Result<Option<Value>> {
	let (parent, leaf) = parent_mut(doc, path, true)?;
	match parent {
		Container::Document(parent) => Ok(parent.insert(leaf.to_string(), value)),
		Container::Array(items) => {
			let index = leaf.parse::<usize>().map_err(|_| not_viable(path))?;
			if index >= items.len() {
				let len = index
					.checked_add(1)
					.filter(|len| len - items.len() <= MAX_PADDING)
					.ok_or_else(|| StoreError::operation(codes::BAD_VALUE, format!("can't backfill array to index {index} along path '{path}'")))?;
				items.resize(len, Value::Null);
			}
			Ok(Some(std::mem::replace(&mut items[index], value)))
		}
		Container::Missing => Err(not_viable(path)),
	}
}

/// Removes `path`. Array elements are nulled rather than shifted.
pub(crate) fn remove(doc: &mut Document, path: &str) -> Option<Value> {
	match parent_mut(doc, path, false).ok()? {
		(Container::Document(parent), leaf) => parent.shift_remove(leaf),
		(Container::Array(items), leaf) => {
			let slot = items.get_mut(leaf.parse::<usize>().ok()?)?;
			Some(std::mem::take(slot))
		}
		(Container::Missing, _) => None,
	}
}

enum Container<'a> {
	Document(&'a mut Document),
	Array(&'a mut Vec<Value>),
	Missing,
}

fn parent_mut<'a, 'p>(doc: &'a mut Document, path: &'p str, create: bool) -> Result<(Container<'a>, &'p str)> {
	let (parents, leaf) = match path.rsplit_once('.') {
		Some((parents, leaf)) => (Some(parents), leaf),
		None => (None, path),
	};
	if leaf.is_empty() {
		return Err(StoreError::operation(codes::BAD_VALUE, format!("empty field name in path '{path}'")));
	}
	let Some(parents) = parents else {
		return Ok((Container::Document(doc), leaf));
	};

	let mut segments = parents.split('.');
	let first = segments.next().unwrap_or_default();
	if !doc.contains_key(first) {
		if !create {
			return Ok((Container::Missing, leaf));
		}
		doc.insert(first.to_string(), Value::Document(Document::new()));
	}
	let mut current = doc.get_mut(first).ok_or_else(|| not_viable(path))?;
	for segment in segments {
		current = match current {
			Value::Document(inner) => {
				if !inner.contains_key(segment) {
					if !create {
						return Ok((Container::Missing, leaf));
					}
					inner.insert(segment.to_string(), Value::Document(Document::new()));
				}
				inner.get_mut(segment).ok_or_else(|| not_viable(path))?
			}
			Value::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
				Some(item) => item,
				None if create => return Err(not_viable(path)),
				None => return Ok((Container::Missing, leaf)),
			},
			_ if create => return Err(not_viable(path)),
			_ => return Ok((Container::Missing, leaf)),
		};
	}
	match current {
		Value::Document(inner) => Ok((Container::Document(inner), leaf)),
		Value::Array(items) => Ok((Container::Array(items), leaf)),
		_ if create => Err(not_viable(path)),
		_ => Ok((Container::Missing, leaf)),
	}
}

fn not_viable(path: &str) -> StoreError {
	StoreError::operation(codes::PATH_NOT_VIABLE, format!("cannot create field along path '{path}'"))
}
