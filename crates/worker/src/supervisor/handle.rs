use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::{ActorContext, ActorExit, ActorRestartPolicy, ActorSpec, Factory, WorkerActor};
use crate::mailbox::{MailboxReceiver, MailboxSendError, MailboxSender, mailbox};
use crate::{ActorEventReceiver, TaskClass};

/// Owner handle for one supervised actor.
///
/// Dropping the handle cancels the actor and closes its mailbox.
pub struct ActorHandle<Cmd: Send + 'static, Evt: Clone + Send + 'static> {
	name: String,
	tx: MailboxSender<Cmd>,
	events: broadcast::Sender<Evt>,
	cancel: CancellationToken,
	generation: Arc<AtomicU64>,
	last_exit: Arc<Mutex<Option<ActorExit>>>,
	finished: watch::Receiver<bool>,
}

impl<Cmd: Send + 'static, Evt: Clone + Send + 'static> Drop for ActorHandle<Cmd, Evt> {
	fn drop(&mut self) {
		self.cancel();
	}
}

impl<Cmd: Send + 'static, Evt: Clone + Send + 'static> ActorHandle<Cmd, Evt> {
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Generation currently running, 0 before the first one started.
	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	/// True once the actor stopped accepting commands.
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed() || self.cancel.is_cancelled()
	}

	pub fn subscribe(&self) -> ActorEventReceiver<Evt> {
		self.events.subscribe()
	}

	pub fn sender(&self) -> MailboxSender<Cmd> {
		self.tx.clone()
	}

	/// Queues one command, waiting for mailbox room.
	pub async fn send(&self, cmd: Cmd) -> Result<(), MailboxSendError> {
		self.tx.send(cmd).await
	}

	/// Stops the actor without waiting. Queued commands are dropped, so
	/// their reply channels close.
	pub fn cancel(&self) {
		self.cancel.cancel();
		self.tx.close();
	}

	/// How the most recent generation ended.
	pub fn last_exit(&self) -> Option<ActorExit> {
		self.last_exit.lock().clone()
	}

	/// Waits until the supervisor gives up on the actor, then returns the
	/// last exit. Never returns while the actor keeps running.
	pub async fn join(&self) -> Option<ActorExit> {
		let mut finished = self.finished.clone();
		let _ = finished.wait_for(|done| *done).await;
		self.last_exit()
	}

	/// Cancels the actor and waits until its supervisor has finished.
	pub async fn shutdown(&self) -> Option<ActorExit> {
		self.cancel();
		self.join().await
	}
}

/// Spawns the supervisor task for `spec` on the ambient runtime.
pub fn spawn_supervised_actor<A: WorkerActor>(spec: ActorSpec<A>) -> ActorHandle<A::Cmd, A::Evt> {
	let (tx, rx) = mailbox(spec.mailbox.capacity);
	let (events, _) = broadcast::channel(spec.supervisor.event_buffer.max(1));
	let cancel = CancellationToken::new();
	let generation = Arc::new(AtomicU64::new(0));
	let last_exit = Arc::new(Mutex::new(None));
	let (done, finished) = watch::channel(false);

	let supervisor = Supervisor {
		name: spec.name.clone(),
		class: spec.class,
		factory: spec.factory,
		restart: spec.supervisor.restart,
		tx: tx.clone(),
		rx,
		events: events.clone(),
		cancel: cancel.clone(),
		generation: Arc::clone(&generation),
		last_exit: Arc::clone(&last_exit),
	};
	crate::spawn(spec.class, async move {
		supervisor.run().await;
		let _ = done.send(true);
	});

	ActorHandle { name: spec.name, tx, events, cancel, generation, last_exit, finished }
}

struct Supervisor<A: WorkerActor> {
	name: String,
	class: TaskClass,
	factory: Factory<A>,
	restart: ActorRestartPolicy,
	tx: MailboxSender<A::Cmd>,
	rx: MailboxReceiver<A::Cmd>,
	events: broadcast::Sender<A::Evt>,
	cancel: CancellationToken,
	generation: Arc<AtomicU64>,
	last_exit: Arc<Mutex<Option<ActorExit>>>,
}

impl<A: WorkerActor> Supervisor<A> {
	async fn run(self) {
		let mut restarts = 0usize;
		loop {
			let generation = self.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
			let token = self.cancel.child_token();
			let ctx = ActorContext { events: self.events.clone(), generation, cancel: token.clone() };
			let instance = crate::spawn(self.class, run_instance((self.factory)(), self.rx.clone(), ctx));
			let exit = match instance.await {
				Ok(exit) => exit,
				Err(error) if error.is_panic() => ActorExit::Panicked,
				Err(_) => ActorExit::Cancelled,
			};
			// Tasks the generation left behind must not outlive it.
			token.cancel();

			tracing::debug!(actor = %self.name, class = ?self.class, generation, restarts, ?exit, "worker.actor.exit");
			let backoff = if self.cancel.is_cancelled() { None } else { self.restart.backoff(&exit, restarts) };
			*self.last_exit.lock() = Some(exit);
			let Some(backoff) = backoff else {
				break;
			};

			restarts += 1;
			tokio::select! {
				_ = self.cancel.cancelled() => break,
				_ = tokio::time::sleep(backoff) => {}
			}
		}

		self.tx.close();
		let dropped = self.rx.clear();
		if dropped > 0 {
			tracing::debug!(actor = %self.name, dropped, "worker.actor.mailbox_drained");
		}
	}
}

async fn run_instance<A: WorkerActor>(mut actor: A, rx: MailboxReceiver<A::Cmd>, mut ctx: ActorContext<A::Evt>) -> ActorExit {
	let cancel = ctx.cancel.clone();

	tokio::select! {
		biased;
		_ = cancel.cancelled() => return ActorExit::Cancelled,
		started = actor.on_start(&mut ctx) => {
			if let Err(reason) = started {
				return ActorExit::StartupFailed(reason);
			}
		}
	}

	let exit = loop {
		let cmd = tokio::select! {
			biased;
			_ = cancel.cancelled() => break ActorExit::Cancelled,
			cmd = rx.recv() => match cmd {
				Some(cmd) => cmd,
				None => break ActorExit::MailboxClosed,
			},
		};
		let flow = tokio::select! {
			biased;
			_ = cancel.cancelled() => break ActorExit::Cancelled,
			flow = actor.handle(cmd, &mut ctx) => flow,
		};
		match flow {
			Ok(super::ActorFlow::Continue) => {}
			Ok(super::ActorFlow::Stop) => break ActorExit::Stopped,
			Err(reason) => break ActorExit::HandlerFailed(reason),
		}
	};

	actor.on_stop(&mut ctx).await;
	exit
}
