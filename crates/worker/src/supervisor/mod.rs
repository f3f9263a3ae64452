//! Supervised actors.
//!
//! An actor is a [`WorkerActor`] value fed by one mailbox. The supervisor
//! builds a fresh value from the [`ActorSpec`] factory for every generation and
//! restarts it after a failure, within the configured budget. Commands are
//! handled strictly one at a time.

mod handle;
#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub use self::handle::{ActorHandle, spawn_supervised_actor};
use crate::TaskClass;

/// What the actor wants after handling one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorFlow {
	Continue,
	/// End this generation normally. Not restarted.
	Stop,
}

/// Why one generation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorExit {
	Stopped,
	MailboxClosed,
	Cancelled,
	StartupFailed(String),
	HandlerFailed(String),
	Panicked,
}

impl ActorExit {
	/// Exits the restart policy reacts to.
	pub fn is_failure(&self) -> bool {
		matches!(self, Self::StartupFailed(_) | Self::HandlerFailed(_) | Self::Panicked)
	}
}

#[derive(Debug, Clone)]
pub enum ActorRestartPolicy {
	Never,
	OnFailure { max_restarts: usize, backoff: Duration },
}

impl ActorRestartPolicy {
	/// Delay before the next generation, or `None` to stay down.
	fn backoff(&self, exit: &ActorExit, restarts: usize) -> Option<Duration> {
		match self {
			Self::Never => None,
			Self::OnFailure { max_restarts, backoff } => (exit.is_failure() && restarts < *max_restarts).then_some(*backoff),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ActorMailboxSpec {
	pub capacity: usize,
}

impl Default for ActorMailboxSpec {
	fn default() -> Self {
		Self { capacity: 128 }
	}
}

#[derive(Debug, Clone)]
pub struct ActorSupervisorSpec {
	pub restart: ActorRestartPolicy,
	/// Broadcast buffer for emitted events. Slow subscribers lag past it.
	pub event_buffer: usize,
}

impl Default for ActorSupervisorSpec {
	fn default() -> Self {
		Self {
			restart: ActorRestartPolicy::OnFailure { max_restarts: 3, backoff: Duration::from_millis(50) },
			event_buffer: 128,
		}
	}
}

/// Behavior run by the supervisor.
#[async_trait]
pub trait WorkerActor: Send + 'static {
	type Cmd: Send + 'static;
	type Evt: Clone + Send + 'static;

	async fn on_start(&mut self, _ctx: &mut ActorContext<Self::Evt>) -> Result<(), String> {
		Ok(())
	}

	async fn handle(&mut self, cmd: Self::Cmd, ctx: &mut ActorContext<Self::Evt>) -> Result<ActorFlow, String>;

	async fn on_stop(&mut self, _ctx: &mut ActorContext<Self::Evt>) {}
}

/// Per-generation context handed to every [`WorkerActor`] callback.
pub struct ActorContext<Evt> {
	events: broadcast::Sender<Evt>,
	generation: u64,
	cancel: CancellationToken,
}

impl<Evt: Clone + Send + 'static> ActorContext<Evt> {
	/// Broadcasts `evt` to current subscribers. Dropped when nobody listens.
	pub fn emit(&self, evt: Evt) {
		let _ = self.events.send(evt);
	}

	/// Generation number, starting at 1 and bumped on every restart.
	pub fn generation(&self) -> u64 {
		self.generation
	}
}

type Factory<A> = Arc<dyn Fn() -> A + Send + Sync>;

/// Everything needed to spawn one supervised actor.
pub struct ActorSpec<A: WorkerActor> {
	name: String,
	class: TaskClass,
	mailbox: ActorMailboxSpec,
	supervisor: ActorSupervisorSpec,
	factory: Factory<A>,
}

impl<A: WorkerActor> ActorSpec<A> {
	/// `factory` runs once per generation, so a restart never sees the
	/// previous generation's state.
	pub fn new(name: impl Into<String>, class: TaskClass, factory: impl Fn() -> A + Send + Sync + 'static) -> Self {
		Self {
			name: name.into(),
			class,
			mailbox: ActorMailboxSpec::default(),
			supervisor: ActorSupervisorSpec::default(),
			factory: Arc::new(factory),
		}
	}

	#[must_use]
	pub fn mailbox(mut self, mailbox: ActorMailboxSpec) -> Self {
		self.mailbox = mailbox;
		self
	}

	#[must_use]
	pub fn supervisor(mut self, supervisor: ActorSupervisorSpec) -> Self {
		self.supervisor = supervisor;
		self
	}
}
