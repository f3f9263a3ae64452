//! Operation dispatch over one database's collections.

use std::collections::HashMap;

use docshard_rpc::{Document, ObjectId, Value};
use indexmap::IndexMap;

use super::aggregate::{self, Catalog};
use super::compare::equals;
use super::update::{self, Upsert};
use super::{filter, path, projection, sort};
use crate::error::codes;
use crate::options::ReturnDocument;
use crate::{DeleteResult, InsertManyResult, InsertOneResult, Operation, Outcome, Result, StoreError, UpdateResult};

#[derive(Debug, Clone, Default)]
pub(crate) struct CollectionState {
	pub(crate) docs: Vec<Document>,
	/// Bumped by every write; commit compares it against the transaction's view.
	pub(crate) version: u64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DbState {
	pub(crate) collections: HashMap<String, CollectionState>,
}

impl DbState {
	pub(crate) fn version(&self, collection: &str) -> u64 {
		self.collections.get(collection).map_or(0, |c| c.version)
	}

	fn docs(&self, collection: &str) -> &[Document] {
		self.collections.get(collection).map_or(&[], |c| c.docs.as_slice())
	}

	fn docs_mut(&mut self, collection: &str) -> &mut Vec<Document> {
		&mut self.collections.entry(collection.to_string()).or_default().docs
	}
}

impl Catalog for DbState {
	fn documents(&self, collection: &str) -> Vec<Document> {
		self.docs(collection).to_vec()
	}

	fn replace_all(&mut self, collection: &str, documents: Vec<Document>) {
		*self.docs_mut(collection) = documents;
	}
}

/// Collections `op` writes to, including an aggregation's `$out` target.
pub(crate) fn writes(collection: &str, op: &Operation) -> Vec<String> {
	let mut written = Vec::new();
	if is_write(op) {
		written.push(collection.to_string());
	}
	if let Operation::Aggregate { pipeline, .. } = op
		&& let Some(target) = out_target(pipeline)
	{
		written.push(target);
	}
	written
}

/// Runs `op` against `collection` in `db`. A failed write may leave a
/// prefix of its effects applied.
pub(crate) fn execute(db: &mut DbState, collection: &str, op: Operation) -> Result<Outcome> {
	let outcome = match op {
		Operation::FindOne { filter, options } => {
			let docs = db.docs(collection);
			let hits = select(docs, &filter, options.sort.as_ref(), options.skip.unwrap_or(0), Some(1))?;
			Outcome::Document(hits.first().map(|&i| shape(&docs[i], options.projection.as_ref())).transpose()?)
		}
		Operation::Find { filter, options } => {
			let docs = db.docs(collection);
			let limit = options.limit.map(i64::unsigned_abs).filter(|n| *n > 0).map(|n| n as usize);
			let hits = select(docs, &filter, options.sort.as_ref(), options.skip.unwrap_or(0), limit)?;
			Outcome::Documents(hits.iter().map(|&i| shape(&docs[i], options.projection.as_ref())).collect::<Result<_>>()?)
		}
		Operation::FindOneAndUpdate { filter, update, options } => find_and_modify(
			db.docs_mut(collection),
			collection,
			&filter,
			Upsert::Operators(&update),
			options.sort.as_ref(),
			options.projection.as_ref(),
			options.upsert.unwrap_or(false),
			options.return_document.unwrap_or_default(),
		)?,
		Operation::FindOneAndReplace { filter, replacement, options } => find_and_modify(
			db.docs_mut(collection),
			collection,
			&filter,
			Upsert::Replacement(&replacement),
			options.sort.as_ref(),
			options.projection.as_ref(),
			options.upsert.unwrap_or(false),
			options.return_document.unwrap_or_default(),
		)?,
		Operation::FindOneAndDelete { filter, options } => {
			let docs = db.docs_mut(collection);
			let hits = select(docs, &filter, options.sort.as_ref(), 0, Some(1))?;
			match hits.first() {
				Some(&i) => {
					let removed = docs.remove(i);
					Outcome::Document(Some(shape(&removed, options.projection.as_ref())?))
				}
				None => Outcome::Document(None),
			}
		}
		Operation::InsertOne { document, .. } => {
			let docs = db.docs_mut(collection);
			let (id, document) = with_id(document);
			ensure_unique(docs, collection, &id)?;
			docs.push(document);
			Outcome::InsertOne(InsertOneResult { acknowledged: true, inserted_id: id })
		}
		Operation::InsertMany { documents, options } => {
			let docs = db.docs_mut(collection);
			let ordered = options.ordered.unwrap_or(true);
			let mut inserted_ids = IndexMap::new();
			let mut first_error = None;
			for (index, document) in documents.into_iter().enumerate() {
				let (id, document) = with_id(document);
				if let Err(error) = ensure_unique(docs, collection, &id) {
					if ordered {
						return Err(error);
					}
					first_error.get_or_insert(error);
					continue;
				}
				docs.push(document);
				inserted_ids.insert(index, id);
			}
			if let Some(error) = first_error {
				return Err(error);
			}
			Outcome::InsertMany(InsertManyResult { acknowledged: true, inserted_count: inserted_ids.len() as u64, inserted_ids })
		}
		Operation::UpdateOne { filter, update, options } => update_matching(db.docs_mut(collection), collection, &filter, &update, options.upsert.unwrap_or(false), false)?,
		Operation::UpdateMany { filter, update, options } => update_matching(db.docs_mut(collection), collection, &filter, &update, options.upsert.unwrap_or(false), true)?,
		Operation::DeleteOne { filter, .. } => delete_matching(db.docs_mut(collection), &filter, false)?,
		Operation::DeleteMany { filter, .. } => delete_matching(db.docs_mut(collection), &filter, true)?,
		Operation::Aggregate { pipeline, .. } => {
			let input = db.documents(collection);
			Outcome::Documents(aggregate::run(input, &pipeline, db)?)
		}
		Operation::Distinct { field, filter, .. } => {
			let mut values: Vec<Value> = Vec::new();
			for doc in db.docs(collection) {
				if !filter::matches(doc, &filter)? {
					continue;
				}
				for value in path::get_all(doc, &field) {
					let flattened = match value {
						Value::Array(items) => items.clone(),
						other => vec![other.clone()],
					};
					for value in flattened {
						if !values.iter().any(|seen| equals(seen, &value)) {
							values.push(value);
						}
					}
				}
			}
			Outcome::Values(values)
		}
		Operation::CountDocuments { filter, options } => {
			let limit = options.limit.filter(|n| *n > 0).map(|n| n as usize);
			let hits = select(db.docs(collection), &filter, None, options.skip.unwrap_or(0), limit)?;
			Outcome::Count(hits.len() as u64)
		}
	};
	Ok(outcome)
}

fn is_write(op: &Operation) -> bool {
	!matches!(
		op,
		Operation::FindOne { .. } | Operation::Find { .. } | Operation::Aggregate { .. } | Operation::Distinct { .. } | Operation::CountDocuments { .. }
	)
}

fn out_target(pipeline: &[Document]) -> Option<String> {
	match pipeline.last()?.get("$out")? {
		Value::String(coll) => Some(coll.clone()),
		Value::Document(spec) => spec.get("coll").and_then(Value::as_str).map(str::to_string),
		_ => None,
	}
}

/// Indices of matching documents after sort, skip and limit.
fn select(docs: &[Document], filter: &Document, sort_spec: Option<&Document>, skip: u64, limit: Option<usize>) -> Result<Vec<usize>> {
	let mut hits = Vec::new();
	for (i, doc) in docs.iter().enumerate() {
		if filter::matches(doc, filter)? {
			hits.push((i, doc));
		}
	}
	if let Some(spec) = sort_spec.filter(|s| !s.is_empty()) {
		sort::sort_by_spec(&mut hits, spec, |(_, doc)| *doc)?;
	}
	let hits = hits.into_iter().map(|(i, _)| i).skip(usize::try_from(skip).unwrap_or(usize::MAX));
	Ok(match limit {
		Some(n) => hits.take(n).collect(),
		None => hits.collect(),
	})
}

fn shape(doc: &Document, projection_spec: Option<&Document>) -> Result<Document> {
	match projection_spec {
		Some(spec) if !spec.is_empty() => projection::project(doc, spec),
		_ => Ok(doc.clone()),
	}
}

/// Returns the document's `_id`, generating one at the front when absent.
fn with_id(mut document: Document) -> (Value, Document) {
	if let Some(id) = document.get("_id") {
		return (id.clone(), document);
	}
	let id = Value::ObjectId(ObjectId::new());
	document.shift_insert(0, "_id".to_string(), id.clone());
	(id, document)
}

fn ensure_unique(docs: &[Document], collection: &str, id: &Value) -> Result<()> {
	if docs.iter().any(|d| d.get("_id").is_some_and(|existing| equals(existing, id))) {
		return Err(StoreError::operation(
			codes::DUPLICATE_KEY,
			format!("E11000 duplicate key error collection: {collection} index: _id_ dup key: {{ _id: {} }}", docshard_rpc::codec::serialize(id)),
		));
	}
	Ok(())
}

#[allow(clippy::too_many_arguments)]
fn find_and_modify(
	docs: &mut Vec<Document>,
	collection: &str,
	filter_doc: &Document,
	modification: Upsert<'_>,
	sort_spec: Option<&Document>,
	projection_spec: Option<&Document>,
	upsert: bool,
	return_document: ReturnDocument,
) -> Result<Outcome> {
	let hits = select(docs, filter_doc, sort_spec, 0, Some(1))?;
	let Some(&i) = hits.first() else {
		if !upsert {
			return Ok(Outcome::Document(None));
		}
		let inserted = update::upsert_document(filter_doc, modification)?;
		ensure_unique(docs, collection, inserted.get("_id").unwrap_or(&Value::Null))?;
		docs.push(inserted.clone());
		return Ok(Outcome::Document(match return_document {
			ReturnDocument::After => Some(shape(&inserted, projection_spec)?),
			ReturnDocument::Before => None,
		}));
	};

	let before = docs[i].clone();
	let mut after = before.clone();
	match modification {
		Upsert::Operators(update) => update::apply(&mut after, update, false)?,
		Upsert::Replacement(replacement) => update::replace(&mut after, replacement)?,
	};
	docs[i] = after;
	let image = match return_document {
		ReturnDocument::Before => &before,
		ReturnDocument::After => &docs[i],
	};
	Ok(Outcome::Document(Some(shape(image, projection_spec)?)))
}

fn update_matching(docs: &mut Vec<Document>, collection: &str, filter_doc: &Document, update_doc: &Document, upsert: bool, many: bool) -> Result<Outcome> {
	let hits = select(docs, filter_doc, None, 0, if many { None } else { Some(1) })?;
	let mut result = UpdateResult { acknowledged: true, matched_count: hits.len() as u64, ..Default::default() };

	if hits.is_empty() && upsert {
		let inserted = update::upsert_document(filter_doc, Upsert::Operators(update_doc))?;
		let id = inserted.get("_id").cloned().unwrap_or(Value::Null);
		ensure_unique(docs, collection, &id)?;
		docs.push(inserted);
		result.upserted_count = 1;
		result.upserted_id = Some(id);
		return Ok(Outcome::Update(result));
	}

	for i in hits {
		let mut next = docs[i].clone();
		if update::apply(&mut next, update_doc, false)? {
			result.modified_count += 1;
			docs[i] = next;
		}
	}
	Ok(Outcome::Update(result))
}

fn delete_matching(docs: &mut Vec<Document>, filter_doc: &Document, many: bool) -> Result<Outcome> {
	let hits = select(docs, filter_doc, None, 0, if many { None } else { Some(1) })?;
	for &i in hits.iter().rev() {
		docs.remove(i);
	}
	Ok(Outcome::Delete(DeleteResult { acknowledged: true, deleted_count: hits.len() as u64 }))
}
