//! In-process [`DocumentStore`] with snapshot transactions.
//!
//! Every database lives behind one lock. A transaction works on a private
//! copy of the database taken when it starts; commit checks that no
//! collection it wrote has moved since, then installs its copies of those
//! collections. A conflicting commit fails with
//! [`StoreError::WriteConflict`] and leaves the live data untouched.

mod aggregate;
mod compare;
mod engine;
mod expr;
mod filter;
mod path;
mod projection;
mod sort;
mod update;

#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use docshard_rpc::Document;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use self::engine::DbState;
use crate::{DocumentStore, Operation, Outcome, PoolOptions, Result, SessionId, StoreConnector, StoreError, TransactionOptions};

#[derive(Default)]
struct Backend {
	databases: Mutex<HashMap<String, Arc<Mutex<DbState>>>>,
	unreachable: AtomicBool,
	connects: AtomicU64,
	pings: AtomicU64,
}

impl Backend {
	fn check_reachable(&self) -> Result<()> {
		if self.unreachable.load(Ordering::Acquire) {
			return Err(StoreError::Connection("server selection timed out: no reachable servers".to_string()));
		}
		Ok(())
	}

	fn database(&self, name: &str) -> Arc<Mutex<DbState>> {
		Arc::clone(self.databases.lock().entry(name.to_string()).or_default())
	}
}

/// Connects to databases held in this process.
///
/// Clones share the same data, so two connections to one database name see
/// each other's writes.
#[derive(Clone, Default)]
pub struct MemoryConnector {
	backend: Arc<Backend>,
}

impl MemoryConnector {
	/// Empty server.
	pub fn new() -> Self {
		Self::default()
	}

	/// Simulates the server going away or coming back. While unreachable,
	/// connects, pings and operations fail with [`StoreError::Connection`].
	pub fn set_reachable(&self, reachable: bool) {
		self.backend.unreachable.store(!reachable, Ordering::Release);
	}

	/// Connection attempts so far, failed ones included.
	pub fn connect_count(&self) -> u64 {
		self.backend.connects.load(Ordering::Relaxed)
	}

	/// Pings answered or refused so far.
	pub fn ping_count(&self) -> u64 {
		self.backend.pings.load(Ordering::Relaxed)
	}

	/// Committed contents of `collection`, in insertion order.
	pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
		let db = self.backend.database(database);
		let state = db.lock();
		state.collections.get(collection).map(|c| c.docs.clone()).unwrap_or_default()
	}
}

#[async_trait]
impl StoreConnector for MemoryConnector {
	async fn connect(&self, database: &str, pool: PoolOptions) -> Result<Arc<dyn DocumentStore>> {
		self.backend.connects.fetch_add(1, Ordering::Relaxed);
		if pool.max_pool_size == 0 {
			return Err(StoreError::InvalidArgument("maxPoolSize must be at least 1".to_string()));
		}
		self.backend.check_reachable()?;
		tracing::debug!(database, max_pool_size = pool.max_pool_size, "store.memory.connect");
		Ok(Arc::new(MemoryStore {
			backend: Arc::clone(&self.backend),
			database: database.to_string(),
			db: self.backend.database(database),
			permits: Semaphore::new(pool.max_pool_size as usize),
			sessions: Mutex::new(HashMap::new()),
		}))
	}
}

struct TxnState {
	snapshot: DbState,
	written: BTreeSet<String>,
	aborted: bool,
	options: TransactionOptions,
}

#[derive(Default)]
struct SessionState {
	txn: Option<TxnState>,
}

/// One connection to a database held by a [`MemoryConnector`].
pub struct MemoryStore {
	backend: Arc<Backend>,
	database: String,
	db: Arc<Mutex<DbState>>,
	permits: Semaphore,
	sessions: Mutex<HashMap<SessionId, SessionState>>,
}

impl MemoryStore {
	/// Runs `op` inside the session's transaction. Returns `None` to fall
	/// through to the live data when the session has no transaction.
	fn execute_in_session(&self, session: SessionId, collection: &str, op: &Operation) -> Option<Result<Outcome>> {
		let mut sessions = self.sessions.lock();
		let Some(state) = sessions.get_mut(&session) else {
			return Some(Err(StoreError::NoSuchSession(session)));
		};
		let txn = state.txn.as_mut()?;
		if txn.aborted {
			return Some(Err(StoreError::TransactionAborted));
		}
		txn.written.extend(engine::writes(collection, op));
		let result = engine::execute(&mut txn.snapshot, collection, op.clone());
		if let Err(error) = &result {
			tracing::debug!(%session, collection, %error, "store.memory.transaction.failed_op");
			txn.aborted = true;
		}
		Some(result)
	}

	fn execute_live(&self, collection: &str, op: Operation) -> Result<Outcome> {
		let written = engine::writes(collection, &op);
		let mut db = self.db.lock();
		let result = engine::execute(&mut db, collection, op);
		for name in written {
			db.collections.entry(name).or_default().version += 1;
		}
		result
	}
}

#[async_trait]
impl DocumentStore for MemoryStore {
	async fn ping(&self) -> Result<()> {
		self.backend.pings.fetch_add(1, Ordering::Relaxed);
		self.backend.check_reachable()
	}

	async fn execute(&self, collection: &str, op: Operation) -> Result<Outcome> {
		let _permit = self.permits.acquire().await.map_err(|_| StoreError::Connection("connection pool closed".to_string()))?;
		self.backend.check_reachable()?;
		if let Some(session) = op.session()
			&& let Some(result) = self.execute_in_session(session, collection, &op)
		{
			return result;
		}
		self.execute_live(collection, op)
	}

	async fn start_session(&self) -> Result<SessionId> {
		self.backend.check_reachable()?;
		let session = SessionId::new();
		self.sessions.lock().insert(session, SessionState::default());
		Ok(session)
	}

	async fn start_transaction(&self, session: SessionId, options: TransactionOptions) -> Result<()> {
		self.backend.check_reachable()?;
		let snapshot = self.db.lock().clone();
		let mut sessions = self.sessions.lock();
		let state = sessions.get_mut(&session).ok_or(StoreError::NoSuchSession(session))?;
		if state.txn.is_some() {
			return Err(StoreError::InvalidArgument(format!("transaction already in progress on session {session}")));
		}
		tracing::trace!(%session, database = %self.database, ?options, "store.memory.transaction.start");
		state.txn = Some(TxnState { snapshot, written: BTreeSet::new(), aborted: false, options });
		Ok(())
	}

	async fn commit_transaction(&self, session: SessionId) -> Result<()> {
		self.backend.check_reachable()?;
		let txn = {
			let mut sessions = self.sessions.lock();
			let state = sessions.get_mut(&session).ok_or(StoreError::NoSuchSession(session))?;
			state.txn.take().ok_or(StoreError::NoTransaction(session))?
		};
		if txn.aborted {
			return Err(StoreError::TransactionAborted);
		}
		let TxnState { mut snapshot, written, options, .. } = txn;

		let mut db = self.db.lock();
		if let Some(moved) = written.iter().find(|name| db.version(name) != snapshot.version(name)) {
			tracing::debug!(%session, collection = %moved, "store.memory.transaction.conflict");
			return Err(StoreError::WriteConflict { collection: moved.clone() });
		}
		for name in written {
			let mut collection = snapshot.collections.remove(&name).unwrap_or_default();
			collection.version = db.version(&name) + 1;
			db.collections.insert(name, collection);
		}
		tracing::trace!(%session, database = %self.database, write_concern = ?options.write_concern, "store.memory.transaction.commit");
		Ok(())
	}

	async fn abort_transaction(&self, session: SessionId) -> Result<()> {
		let mut sessions = self.sessions.lock();
		let state = sessions.get_mut(&session).ok_or(StoreError::NoSuchSession(session))?;
		state.txn.take().map(|_| ()).ok_or(StoreError::NoTransaction(session))
	}

	async fn end_session(&self, session: SessionId) {
		if let Some(state) = self.sessions.lock().remove(&session)
			&& state.txn.is_some()
		{
			tracing::debug!(%session, "store.memory.session.ended_with_transaction");
		}
	}
}
