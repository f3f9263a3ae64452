//! Lazy `find` and `aggregate` builders.
//!
//! A cursor only accumulates a query. Each terminal call sends the whole
//! query again and materializes every result, so repeated calls against an
//! unchanged collection return equal results. Nothing is held open on the
//! server between calls.

use std::vec;

use docshard_rpc::{Document, Value, doc};
use docshard_store::options::{AggregateOptions, FindOptions};
use docshard_store::{Operation, Outcome};
use futures::stream::Iter;

use crate::Result;
use crate::client::{Collection, unexpected};

/// Query builder returned by [`Collection::find`].
#[derive(Debug, Clone)]
#[must_use = "a cursor does nothing until a terminal call"]
pub struct FindCursor {
	collection: Collection,
	filter: Document,
	options: FindOptions,
}

impl FindCursor {
	pub(crate) fn new(collection: Collection, filter: Document) -> Self {
		Self { collection, filter, options: FindOptions::default() }
	}

	pub fn limit(mut self, limit: i64) -> Self {
		self.options.limit = Some(limit);
		self
	}

	pub fn skip(mut self, skip: u64) -> Self {
		self.options.skip = Some(skip);
		self
	}

	pub fn sort(mut self, sort: Document) -> Self {
		self.options.sort = Some(sort);
		self
	}

	/// Sets the projection.
	pub fn project(mut self, projection: Document) -> Self {
		self.options.projection = Some(projection);
		self
	}

	pub fn batch_size(mut self, size: u32) -> Self {
		self.options.batch_size = Some(size);
		self
	}

	pub fn max_time_ms(mut self, ms: u64) -> Self {
		self.options.max_time_ms = Some(ms);
		self
	}

	pub fn hint(mut self, hint: impl Into<Value>) -> Self {
		self.options.hint = Some(hint.into());
		self
	}

	pub fn collation(mut self, collation: Document) -> Self {
		self.options.collation = Some(collation);
		self
	}

	pub fn allow_disk_use(mut self, allow: bool) -> Self {
		self.options.allow_disk_use = Some(allow);
		self
	}

	pub fn options(&self) -> &FindOptions {
		&self.options
	}

	async fn fetch(&self, options: FindOptions) -> Result<Vec<Document>> {
		let op = Operation::Find { filter: self.filter.clone(), options };
		match self.collection.run(op).await? {
			Outcome::Documents(docs) => Ok(docs),
			other => Err(unexpected("find", &other)),
		}
	}

	/// Every matching document.
	pub async fn to_array(&self) -> Result<Vec<Document>> {
		self.fetch(self.options.clone()).await
	}

	/// First matching document. Runs the query with a limit of one.
	pub async fn next(&self) -> Result<Option<Document>> {
		let options = FindOptions { limit: Some(1), ..self.options.clone() };
		Ok(self.fetch(options).await?.into_iter().next())
	}

	/// Results of [`FindCursor::to_array`] as a stream.
	pub async fn stream(&self) -> Result<Iter<vec::IntoIter<Document>>> {
		Ok(futures::stream::iter(self.to_array().await?))
	}

	/// Number of documents [`FindCursor::to_array`] returns.
	pub async fn count(&self) -> Result<usize> {
		Ok(self.to_array().await?.len())
	}
}

/// Pipeline builder returned by [`Collection::aggregate`].
#[derive(Debug, Clone)]
#[must_use = "a cursor does nothing until a terminal call"]
pub struct AggregateCursor {
	collection: Collection,
	pipeline: Vec<Document>,
	options: AggregateOptions,
}

impl AggregateCursor {
	pub(crate) fn new(collection: Collection, pipeline: Vec<Document>) -> Self {
		Self { collection, pipeline, options: AggregateOptions::default() }
	}

	/// Appends a stage as given.
	pub fn add_stage(mut self, stage: Document) -> Self {
		self.pipeline.push(stage);
		self
	}

	fn stage(self, name: &str, spec: impl Into<Value>) -> Self {
		self.add_stage(doc! { name => spec.into() })
	}

	pub fn limit(self, limit: i64) -> Self {
		self.stage("$limit", limit)
	}

	pub fn skip(self, skip: i64) -> Self {
		self.stage("$skip", skip)
	}

	pub fn sort(self, sort: Document) -> Self {
		self.stage("$sort", sort)
	}

	pub fn project(self, projection: Document) -> Self {
		self.stage("$project", projection)
	}

	/// Appends a `$match` stage.
	pub fn filter(self, filter: Document) -> Self {
		self.stage("$match", filter)
	}

	pub fn group(self, group: Document) -> Self {
		self.stage("$group", group)
	}

	/// Appends `$unwind`, given either a `"$path"` string or an options document.
	pub fn unwind(self, spec: impl Into<Value>) -> Self {
		self.stage("$unwind", spec)
	}

	pub fn lookup(self, lookup: Document) -> Self {
		self.stage("$lookup", lookup)
	}

	/// Appends `$out`, given a collection name or `{db, coll}`.
	pub fn out(self, target: impl Into<Value>) -> Self {
		self.stage("$out", target)
	}

	pub fn redact(self, expression: impl Into<Value>) -> Self {
		self.stage("$redact", expression)
	}

	pub fn geo_near(self, spec: Document) -> Self {
		self.stage("$geoNear", spec)
	}

	pub fn batch_size(mut self, size: u32) -> Self {
		self.options.batch_size = Some(size);
		self
	}

	pub fn max_time_ms(mut self, ms: u64) -> Self {
		self.options.max_time_ms = Some(ms);
		self
	}

	pub fn allow_disk_use(mut self, allow: bool) -> Self {
		self.options.allow_disk_use = Some(allow);
		self
	}

	pub fn collation(mut self, collation: Document) -> Self {
		self.options.collation = Some(collation);
		self
	}

	pub fn hint(mut self, hint: impl Into<Value>) -> Self {
		self.options.hint = Some(hint.into());
		self
	}

	/// Copy of the stages accumulated so far.
	pub fn pipeline(&self) -> Vec<Document> {
		self.pipeline.clone()
	}

	pub fn options(&self) -> &AggregateOptions {
		&self.options
	}

	async fn fetch(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
		let op = Operation::Aggregate { pipeline, options: self.options.clone() };
		match self.collection.run(op).await? {
			Outcome::Documents(docs) => Ok(docs),
			other => Err(unexpected("aggregate", &other)),
		}
	}

	/// Every pipeline result.
	pub async fn to_array(&self) -> Result<Vec<Document>> {
		self.fetch(self.pipeline.clone()).await
	}

	/// First pipeline result. Runs a copy of the pipeline with `$limit: 1`
	/// appended; the cursor itself is unchanged.
	pub async fn next(&self) -> Result<Option<Document>> {
		let mut pipeline = self.pipeline.clone();
		pipeline.push(doc! { "$limit" => 1 });
		Ok(self.fetch(pipeline).await?.into_iter().next())
	}

	/// Results of [`AggregateCursor::to_array`] as a stream.
	pub async fn stream(&self) -> Result<Iter<vec::IntoIter<Document>>> {
		Ok(futures::stream::iter(self.to_array().await?))
	}

	/// Number of documents [`AggregateCursor::to_array`] returns.
	pub async fn count(&self) -> Result<usize> {
		Ok(self.to_array().await?.len())
	}
}
