use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Operation, Outcome, Result, SessionId, StoreError, TransactionOptions};

/// Connection pool bounds for one store client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
	/// Maximum pooled connections.
	pub max_pool_size: u32,
	/// Maximum connections being established at once.
	pub max_connecting: u32,
}

impl Default for PoolOptions {
	fn default() -> Self {
		Self { max_pool_size: 10, max_connecting: 5 }
	}
}

/// One connected database handle.
///
/// Operations whose options carry a session run inside that session's
/// transaction when one is in progress.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
	/// Cheap liveness probe.
	async fn ping(&self) -> Result<()>;

	/// Runs `op` against `collection`. Unknown collections behave as empty.
	async fn execute(&self, collection: &str, op: Operation) -> Result<Outcome>;

	/// Opens a session.
	async fn start_session(&self) -> Result<SessionId>;

	/// Begins a transaction on `session`.
	async fn start_transaction(&self, session: SessionId, options: TransactionOptions) -> Result<()>;

	/// Commits the running transaction. A failed commit leaves nothing applied.
	async fn commit_transaction(&self, session: SessionId) -> Result<()>;

	/// Discards the running transaction.
	async fn abort_transaction(&self, session: SessionId) -> Result<()>;

	/// Ends `session`, discarding any transaction still open on it.
	async fn end_session(&self, session: SessionId);
}

/// Opens [`DocumentStore`] handles.
#[async_trait]
pub trait StoreConnector: Send + Sync + 'static {
	/// Connects to `database` with the given pool bounds.
	async fn connect(&self, database: &str, pool: PoolOptions) -> Result<Arc<dyn DocumentStore>>;
}

/// A session with one running transaction.
///
/// Finish with [`Transaction::commit`] or [`Transaction::abort`]; both end
/// the session whatever the outcome. Dropping an unfinished transaction
/// leaves its session open on the store until the store discards it.
pub struct Transaction {
	store: Arc<dyn DocumentStore>,
	session: SessionId,
	finished: bool,
}

impl Transaction {
	/// Starts a session and a transaction on it.
	pub async fn start(store: Arc<dyn DocumentStore>, options: TransactionOptions) -> Result<Self> {
		let session = store.start_session().await?;
		if let Err(error) = store.start_transaction(session, options).await {
			store.end_session(session).await;
			return Err(error);
		}
		tracing::debug!(%session, "store.transaction.start");
		Ok(Self { store, session, finished: false })
	}

	/// Session to bind into each operation.
	pub fn session(&self) -> SessionId {
		self.session
	}

	/// Runs `op` inside the transaction.
	pub async fn execute(&self, collection: &str, op: Operation) -> Result<Outcome> {
		self.store.execute(collection, op.with_session(self.session)).await
	}

	/// Commits and ends the session.
	pub async fn commit(mut self) -> Result<()> {
		self.finished = true;
		let result = self.store.commit_transaction(self.session).await;
		self.store.end_session(self.session).await;
		match &result {
			Ok(()) => tracing::debug!(session = %self.session, "store.transaction.commit"),
			Err(error) => tracing::warn!(session = %self.session, %error, "store.transaction.commit_failed"),
		}
		result
	}

	/// Aborts and ends the session. An abort failure is logged, not returned,
	/// so the caller keeps the error that caused the abort.
	pub async fn abort(mut self) {
		self.finished = true;
		match self.store.abort_transaction(self.session).await {
			Ok(()) | Err(StoreError::NoTransaction(_)) => tracing::debug!(session = %self.session, "store.transaction.abort"),
			Err(error) => tracing::error!(session = %self.session, %error, "store.transaction.abort_failed"),
		}
		self.store.end_session(self.session).await;
	}
}

impl Drop for Transaction {
	fn drop(&mut self) {
		if !self.finished {
			tracing::warn!(session = %self.session, "store.transaction.dropped");
		}
	}
}
