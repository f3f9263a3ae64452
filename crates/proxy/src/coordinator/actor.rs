use std::sync::Arc;

use async_trait::async_trait;
use docshard_rpc::{RpcPayload, RpcResponse};
use docshard_store::{DocumentStore, Operation, SessionId, StoreConnector, Transaction, TransactionOptions};
use docshard_worker::{ActorContext, ActorFlow, Alarm, WorkerActor};

use super::heartbeat::Heartbeat;
use super::{Command, CoordinatorEvent, CoordinatorSettings};
use crate::Result;

/// One incarnation of a shard coordinator.
///
/// Owns the store connection for its shard. The connection is opened on
/// start and reopened by the next command whenever it is missing.
pub(crate) struct Coordinator {
	name: String,
	connector: Arc<dyn StoreConnector>,
	settings: Arc<CoordinatorSettings>,
	alarm: Alarm,
	store: Option<Arc<dyn DocumentStore>>,
	heartbeat: Heartbeat,
}

impl Coordinator {
	pub(crate) fn new(name: String, connector: Arc<dyn StoreConnector>, settings: Arc<CoordinatorSettings>, alarm: Alarm) -> Self {
		let heartbeat = Heartbeat::new(settings.heartbeat.ping_every);
		Self { name, connector, settings, alarm, store: None, heartbeat }
	}

	async fn connection(&mut self, ctx: &ActorContext<CoordinatorEvent>) -> Result<Arc<dyn DocumentStore>> {
		if let Some(store) = &self.store {
			return Ok(Arc::clone(store));
		}
		match self.connector.connect(&self.settings.database, self.settings.pool).await {
			Ok(store) => {
				tracing::info!(instance = %self.name, database = %self.settings.database, "coordinator.connect");
				ctx.emit(CoordinatorEvent::Connected);
				self.store = Some(Arc::clone(&store));
				Ok(store)
			}
			Err(error) => {
				tracing::error!(instance = %self.name, database = %self.settings.database, %error, "coordinator.connect.failed");
				ctx.emit(CoordinatorEvent::ConnectFailed);
				Err(error.into())
			}
		}
	}

	/// Arms the keep-alive wake unless one is already pending.
	fn ensure_scheduled(&self) {
		if self.alarm.get().is_some() {
			return;
		}
		match self.alarm.set_after(self.settings.heartbeat.interval()) {
			Ok(()) => tracing::debug!(instance = %self.name, "coordinator.heartbeat.scheduled"),
			Err(error) => tracing::error!(instance = %self.name, %error, "coordinator.heartbeat.schedule_failed"),
		}
	}

	async fn on_wake(&mut self, ctx: &ActorContext<CoordinatorEvent>) {
		let pinged = if self.heartbeat.tick() {
			let probe = match self.connection(ctx).await {
				Ok(store) => store.ping().await.map_err(crate::Error::from),
				Err(error) => Err(error),
			};
			match &probe {
				Ok(()) => tracing::debug!(instance = %self.name, "coordinator.heartbeat.ping"),
				Err(error) => tracing::error!(instance = %self.name, %error, "coordinator.heartbeat.ping_failed"),
			}
			Some(probe.is_ok())
		} else {
			None
		};

		let rearmed = match self.alarm.set_after(self.settings.heartbeat.interval()) {
			Ok(()) => true,
			Err(error) => {
				tracing::error!(instance = %self.name, %error, "coordinator.heartbeat.rearm_failed");
				false
			}
		};
		tracing::trace!(instance = %self.name, fired = self.heartbeat.fired(), ?pinged, "coordinator.heartbeat");
		ctx.emit(CoordinatorEvent::Heartbeat { fired: self.heartbeat.fired(), pinged, rearmed });
	}

	async fn execute(&mut self, payload: RpcPayload, ctx: &ActorContext<CoordinatorEvent>) -> Result<RpcResponse> {
		let (op, collection) = (payload.op, payload.col.clone());
		let result = match self.connection(ctx).await {
			Ok(store) => dispatch(store.as_ref(), payload, None).await,
			Err(error) => Err(error),
		};
		if let Err(error) = &result {
			tracing::error!(instance = %self.name, %op, %collection, in_transaction = false, %error, "coordinator.execute.failed");
		}
		result
	}

	async fn run_transaction(
		&mut self,
		payloads: Vec<RpcPayload>,
		options: TransactionOptions,
		ctx: &ActorContext<CoordinatorEvent>,
	) -> Result<Vec<RpcResponse>> {
		let store = self.connection(ctx).await?;
		let txn = Transaction::start(Arc::clone(&store), options).await.inspect_err(|error| {
			tracing::error!(instance = %self.name, %error, "coordinator.transaction.start_failed");
		})?;

		let mut responses = Vec::with_capacity(payloads.len());
		for (step, payload) in payloads.into_iter().enumerate() {
			let (op, collection) = (payload.op, payload.col.clone());
			match dispatch(store.as_ref(), payload, Some(txn.session())).await {
				Ok(response) => responses.push(response),
				Err(error) => {
					tracing::error!(instance = %self.name, %op, %collection, in_transaction = true, step, %error, "coordinator.execute.failed");
					txn.abort().await;
					return Err(error);
				}
			}
		}

		txn.commit().await.inspect_err(|error| {
			tracing::error!(instance = %self.name, %error, "coordinator.transaction.commit_failed");
		})?;
		Ok(responses)
	}
}

/// Decodes `payload`, binds `session` into its options, runs it and encodes
/// the outcome.
async fn dispatch(store: &dyn DocumentStore, payload: RpcPayload, session: Option<SessionId>) -> Result<RpcResponse> {
	let mut op = Operation::from_args(payload.op, payload.args)?;
	if let Some(session) = session {
		op.attach_session(session);
	}
	let outcome = store.execute(&payload.col, op).await?;
	Ok(outcome.to_json())
}

#[async_trait]
impl WorkerActor for Coordinator {
	type Cmd = Command;
	type Evt = CoordinatorEvent;

	async fn on_start(&mut self, ctx: &mut ActorContext<CoordinatorEvent>) -> std::result::Result<(), String> {
		tracing::debug!(instance = %self.name, generation = ctx.generation(), "coordinator.start");
		// A failed connect is retried by the next command.
		let _ = self.connection(ctx).await;
		self.ensure_scheduled();
		Ok(())
	}

	async fn handle(&mut self, cmd: Command, ctx: &mut ActorContext<CoordinatorEvent>) -> std::result::Result<ActorFlow, String> {
		match cmd {
			Command::Execute { payload, reply } => {
				let result = self.execute(payload, ctx).await;
				let _ = reply.send(result);
			}
			Command::RunTransaction { payloads, options, reply } => {
				let result = self.run_transaction(payloads, options, ctx).await;
				let _ = reply.send(result);
			}
			Command::Wake => self.on_wake(ctx).await,
		}
		Ok(ActorFlow::Continue)
	}

	async fn on_stop(&mut self, _ctx: &mut ActorContext<CoordinatorEvent>) {
		tracing::debug!(instance = %self.name, "coordinator.stop");
	}
}
