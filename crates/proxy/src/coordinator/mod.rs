//! Shard coordinators.
//!
//! One coordinator per shard owns that shard's store connection. Callers
//! reach it through a [`CoordinatorStub`], which turns each call into a
//! [`Command`] on the coordinator's mailbox and awaits the reply. The
//! coordinator handles one command at a time, so a transaction's payloads
//! never interleave with other calls to the same shard.

mod actor;
mod heartbeat;
#[cfg(test)]
mod tests;

use docshard_rpc::{RpcPayload, RpcResponse};
use docshard_store::{PoolOptions, TransactionOptions};
use serde_json::Value as JsonValue;
use tokio::sync::oneshot;

pub(crate) use self::actor::Coordinator;
use crate::config::HeartbeatConfig;
use crate::namespace::CoordinatorNamespace;
use crate::{Error, Result};

/// Mailbox message for one coordinator.
pub(crate) enum Command {
	Execute {
		payload: RpcPayload,
		reply: oneshot::Sender<Result<RpcResponse>>,
	},
	RunTransaction {
		payloads: Vec<RpcPayload>,
		options: TransactionOptions,
		reply: oneshot::Sender<Result<Vec<RpcResponse>>>,
	},
	/// Keep-alive wake delivered by the instance's alarm.
	Wake,
}

/// Lifecycle notifications broadcast by a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
	/// A store connection was opened.
	Connected,
	/// Opening the connection failed; the next command retries.
	ConnectFailed,
	/// One keep-alive wake was handled.
	Heartbeat {
		/// Wakes handled by this incarnation, this one included.
		fired: u64,
		/// `None` when no ping was due, otherwise whether it succeeded.
		pinged: Option<bool>,
		/// Whether the next wake was scheduled.
		rearmed: bool,
	},
}

/// Per-coordinator settings shared by every incarnation.
#[derive(Debug, Clone)]
pub(crate) struct CoordinatorSettings {
	pub(crate) database: String,
	pub(crate) pool: PoolOptions,
	pub(crate) heartbeat: HeartbeatConfig,
	pub(crate) mailbox_capacity: usize,
}

/// Client-side handle to one named coordinator.
///
/// A stub names an instance rather than holding it: if the instance was
/// evicted, the next call recreates it.
#[derive(Clone)]
pub struct CoordinatorStub {
	name: String,
	namespace: CoordinatorNamespace,
}

impl std::fmt::Debug for CoordinatorStub {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CoordinatorStub").field("name", &self.name).finish_non_exhaustive()
	}
}

impl CoordinatorStub {
	pub(crate) fn new(name: String, namespace: CoordinatorNamespace) -> Self {
		Self { name, namespace }
	}

	/// Instance name this stub addresses.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Runs one payload outside any transaction.
	pub async fn execute(&self, payload: RpcPayload) -> Result<RpcResponse> {
		self.request(|reply| Command::Execute { payload, reply }).await
	}

	/// Decodes a raw `{col, op, args}` request and runs it. Unknown `op`
	/// strings are rejected here, before anything reaches the coordinator.
	pub async fn execute_json(&self, request: &JsonValue) -> Result<RpcResponse> {
		let payload = RpcPayload::from_json(request)?;
		self.execute(payload).await
	}

	/// Runs `payloads` in order inside one transaction. Any failure aborts
	/// the whole batch.
	pub async fn run_transaction(&self, payloads: Vec<RpcPayload>, options: TransactionOptions) -> Result<Vec<RpcResponse>> {
		self.request(|reply| Command::RunTransaction { payloads, options, reply }).await
	}

	async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
		let (reply, response) = oneshot::channel();
		let Some(sender) = self.namespace.sender(&self.name) else {
			return Err(self.unavailable("namespace shut down"));
		};
		if sender.send(build(reply)).await.is_err() {
			return Err(self.unavailable("mailbox closed"));
		}
		response.await.map_err(|_| self.unavailable("instance stopped before replying"))?
	}

	fn unavailable(&self, reason: &str) -> Error {
		tracing::warn!(instance = %self.name, reason, "coordinator.unavailable");
		Error::CoordinatorUnavailable { name: self.name.clone(), reason: reason.to_string() }
	}
}
