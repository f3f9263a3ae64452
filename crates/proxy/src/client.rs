//! Collection-level client API.
//!
//! [`Database`] hands out [`Collection`]s bound to one [`Transport`]:
//! [`ShardTransport`] sends each call to a shard coordinator over the tagged
//! JSON wire form, while [`DirectTransport`] runs it against an in-process
//! store. Which one is used is decided once, by [`ProxyConfig::dev_direct`].

use std::sync::Arc;

use async_trait::async_trait;
use docshard_rpc::{Document, ProtocolError, RpcPayload, Value};
use docshard_store::options::{
	CountOptions, DeleteOptions, DistinctOptions, FindOneAndDeleteOptions, FindOneAndModifyOptions, FindOptions, InsertManyOptions,
	InsertOneOptions, UpdateOptions,
};
use docshard_store::{
	DeleteResult, DocumentStore, InsertManyResult, InsertOneResult, Operation, Outcome, StoreConnector, Transaction, TransactionOptions,
	UpdateResult,
};

use crate::coordinator::CoordinatorStub;
use crate::cursor::{AggregateCursor, FindCursor};
use crate::namespace::CoordinatorNamespace;
use crate::router::{ShardKey, ShardRouter};
use crate::{Error, ProxyConfig, Result};

/// Carries one typed operation to wherever it runs.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
	async fn execute(&self, collection: &str, op: Operation) -> Result<Outcome>;
}

/// Sends operations to one shard coordinator.
#[derive(Debug, Clone)]
pub struct ShardTransport {
	stub: CoordinatorStub,
}

impl ShardTransport {
	pub fn new(stub: CoordinatorStub) -> Self {
		Self { stub }
	}

	pub fn stub(&self) -> &CoordinatorStub {
		&self.stub
	}
}

#[async_trait]
impl Transport for ShardTransport {
	async fn execute(&self, collection: &str, op: Operation) -> Result<Outcome> {
		let kind = op.kind();
		let payload = RpcPayload::new(collection, kind, op.to_args());
		let response = self.stub.execute(payload).await.inspect_err(|error| {
			tracing::error!(op = %kind, collection, instance = self.stub.name(), %error, "client.rpc.failed");
		})?;
		Ok(Outcome::from_json(kind, response)?)
	}
}

/// Runs operations against an in-process store, skipping the wire form.
#[derive(Clone)]
pub struct DirectTransport {
	store: Arc<dyn DocumentStore>,
}

impl DirectTransport {
	pub fn new(store: Arc<dyn DocumentStore>) -> Self {
		Self { store }
	}
}

#[async_trait]
impl Transport for DirectTransport {
	async fn execute(&self, collection: &str, op: Operation) -> Result<Outcome> {
		Ok(self.store.execute(collection, op).await?)
	}
}

/// One collection behind one transport.
///
/// The transport is fixed when the collection is created, so every call on
/// a sharded collection reaches the same coordinator.
#[derive(Clone)]
pub struct Collection {
	name: String,
	transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Collection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Collection").field("name", &self.name).finish_non_exhaustive()
	}
}

impl Collection {
	pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
		Self { name: name.into(), transport }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub(crate) async fn run(&self, op: Operation) -> Result<Outcome> {
		self.transport.execute(&self.name, op).await
	}

	pub async fn find_one(&self, filter: Document, options: FindOptions) -> Result<Option<Document>> {
		let op = Operation::FindOne { filter, options };
		document(self.run(op).await?)
	}

	/// Lazy query; nothing runs until a terminal call on the cursor.
	pub fn find(&self, filter: Document) -> FindCursor {
		FindCursor::new(self.clone(), filter)
	}

	pub async fn find_one_and_update(&self, filter: Document, update: Document, options: FindOneAndModifyOptions) -> Result<Option<Document>> {
		document(self.run(Operation::FindOneAndUpdate { filter, update, options }).await?)
	}

	pub async fn find_one_and_delete(&self, filter: Document, options: FindOneAndDeleteOptions) -> Result<Option<Document>> {
		document(self.run(Operation::FindOneAndDelete { filter, options }).await?)
	}

	pub async fn find_one_and_replace(&self, filter: Document, replacement: Document, options: FindOneAndModifyOptions) -> Result<Option<Document>> {
		document(self.run(Operation::FindOneAndReplace { filter, replacement, options }).await?)
	}

	pub async fn insert_one(&self, document: Document, options: InsertOneOptions) -> Result<InsertOneResult> {
		match self.run(Operation::InsertOne { document, options }).await? {
			Outcome::InsertOne(result) => Ok(result),
			other => Err(unexpected("insertOne", &other)),
		}
	}

	pub async fn insert_many(&self, documents: Vec<Document>, options: InsertManyOptions) -> Result<InsertManyResult> {
		match self.run(Operation::InsertMany { documents, options }).await? {
			Outcome::InsertMany(result) => Ok(result),
			other => Err(unexpected("insertMany", &other)),
		}
	}

	pub async fn update_one(&self, filter: Document, update: Document, options: UpdateOptions) -> Result<UpdateResult> {
		update_result(self.run(Operation::UpdateOne { filter, update, options }).await?)
	}

	pub async fn update_many(&self, filter: Document, update: Document, options: UpdateOptions) -> Result<UpdateResult> {
		update_result(self.run(Operation::UpdateMany { filter, update, options }).await?)
	}

	pub async fn delete_one(&self, filter: Document, options: DeleteOptions) -> Result<DeleteResult> {
		delete_result(self.run(Operation::DeleteOne { filter, options }).await?)
	}

	pub async fn delete_many(&self, filter: Document, options: DeleteOptions) -> Result<DeleteResult> {
		delete_result(self.run(Operation::DeleteMany { filter, options }).await?)
	}

	/// Lazy pipeline seeded with `pipeline`; more stages can be chained.
	pub fn aggregate(&self, pipeline: Vec<Document>) -> AggregateCursor {
		AggregateCursor::new(self.clone(), pipeline)
	}

	pub async fn distinct(&self, field: impl Into<String>, filter: Document, options: DistinctOptions) -> Result<Vec<Value>> {
		match self.run(Operation::Distinct { field: field.into(), filter, options }).await? {
			Outcome::Values(values) => Ok(values),
			other => Err(unexpected("distinct", &other)),
		}
	}

	pub async fn count_documents(&self, filter: Document, options: CountOptions) -> Result<u64> {
		match self.run(Operation::CountDocuments { filter, options }).await? {
			Outcome::Count(n) => Ok(n),
			other => Err(unexpected("countDocuments", &other)),
		}
	}
}

fn document(outcome: Outcome) -> Result<Option<Document>> {
	match outcome {
		Outcome::Document(doc) => Ok(doc),
		other => Err(unexpected("document", &other)),
	}
}

fn update_result(outcome: Outcome) -> Result<UpdateResult> {
	match outcome {
		Outcome::Update(result) => Ok(result),
		other => Err(unexpected("update", &other)),
	}
}

fn delete_result(outcome: Outcome) -> Result<DeleteResult> {
	match outcome {
		Outcome::Delete(result) => Ok(result),
		other => Err(unexpected("delete", &other)),
	}
}

pub(crate) fn unexpected(expected: &str, outcome: &Outcome) -> Error {
	ProtocolError::InvalidPayload(format!("expected a {expected} result, got {}", outcome.to_json())).into()
}

/// One step of a [`Database::run_transaction`] batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionStep {
	pub collection: String,
	pub op: Operation,
}

impl TransactionStep {
	pub fn new(collection: impl Into<String>, op: Operation) -> Self {
		Self { collection: collection.into(), op }
	}
}

enum Backend {
	Sharded(ShardRouter),
	Direct(Arc<dyn DocumentStore>),
}

/// Entry point: collections and transactions for one configured database.
pub struct Database {
	backend: Backend,
}

impl Database {
	/// Validates `config` and sets up the transport it selects. Direct mode
	/// connects immediately; sharded mode creates coordinators on first use.
	pub async fn connect(config: &ProxyConfig, connector: Arc<dyn StoreConnector>) -> Result<Self> {
		config.validate()?;
		let backend = if config.dev_direct {
			tracing::info!(database = %config.database, "client.direct");
			Backend::Direct(connector.connect(&config.database, config.pool).await?)
		} else {
			let namespace = CoordinatorNamespace::new(connector, config);
			Backend::Sharded(ShardRouter::new(config.shards, config.instance_prefix.clone(), namespace))
		};
		Ok(Self { backend })
	}

	/// Collection `name`, routed by `shard_key`. Without a key, a random
	/// shard is picked once for this handle.
	pub fn collection(&self, name: &str, shard_key: Option<&ShardKey>) -> Collection {
		let transport: Arc<dyn Transport> = match &self.backend {
			Backend::Sharded(router) => Arc::new(ShardTransport::new(router.resolve(shard_key))),
			Backend::Direct(store) => Arc::new(DirectTransport::new(Arc::clone(store))),
		};
		Collection::new(name, transport)
	}

	/// Runs `steps` in order as one all-or-nothing transaction and returns
	/// each step's outcome.
	pub async fn run_transaction(&self, steps: Vec<TransactionStep>, options: TransactionOptions, shard_key: Option<&ShardKey>) -> Result<Vec<Outcome>> {
		match &self.backend {
			Backend::Sharded(router) => {
				let stub = router.resolve(shard_key);
				let kinds: Vec<_> = steps.iter().map(|step| step.op.kind()).collect();
				let payloads = steps.into_iter().map(|step| RpcPayload::new(step.collection, step.op.kind(), step.op.to_args())).collect();
				let responses = stub.run_transaction(payloads, options).await.inspect_err(|error| {
					tracing::error!(instance = stub.name(), %error, "client.transaction.failed");
				})?;
				if responses.len() != kinds.len() {
					return Err(ProtocolError::InvalidPayload(format!("expected {} transaction results, got {}", kinds.len(), responses.len())).into());
				}
				kinds.into_iter().zip(responses).map(|(kind, response)| Outcome::from_json(kind, response).map_err(Error::from)).collect()
			}
			Backend::Direct(store) => {
				let txn = Transaction::start(Arc::clone(store), options).await?;
				let mut outcomes = Vec::with_capacity(steps.len());
				for step in steps {
					match txn.execute(&step.collection, step.op).await {
						Ok(outcome) => outcomes.push(outcome),
						Err(error) => {
							tracing::error!(collection = %step.collection, %error, "client.transaction.failed");
							txn.abort().await;
							return Err(error.into());
						}
					}
				}
				txn.commit().await?;
				Ok(outcomes)
			}
		}
	}

	/// Coordinator namespace in sharded mode.
	pub fn namespace(&self) -> Option<&CoordinatorNamespace> {
		match &self.backend {
			Backend::Sharded(router) => Some(router.namespace()),
			Backend::Direct(_) => None,
		}
	}

	pub fn router(&self) -> Option<&ShardRouter> {
		match &self.backend {
			Backend::Sharded(router) => Some(router),
			Backend::Direct(_) => None,
		}
	}

	/// Stops every coordinator. A no-op in direct mode.
	pub async fn shutdown(&self) {
		if let Some(namespace) = self.namespace() {
			namespace.shutdown().await;
		}
	}
}
