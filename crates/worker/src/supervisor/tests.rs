use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;

use super::*;

/// Echoes every number back as an event; stops on zero, fails on negatives.
struct Echo {
	starts: Arc<AtomicUsize>,
	stops: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerActor for Echo {
	type Cmd = i32;
	type Evt = (u64, i32);

	async fn on_start(&mut self, _ctx: &mut ActorContext<Self::Evt>) -> Result<(), String> {
		self.starts.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn handle(&mut self, cmd: i32, ctx: &mut ActorContext<Self::Evt>) -> Result<ActorFlow, String> {
		ctx.emit((ctx.generation(), cmd));
		match cmd {
			0 => Ok(ActorFlow::Stop),
			n if n < 0 => Err(format!("negative: {n}")),
			_ => Ok(ActorFlow::Continue),
		}
	}

	async fn on_stop(&mut self, _ctx: &mut ActorContext<Self::Evt>) {
		self.stops.fetch_add(1, Ordering::SeqCst);
	}
}

struct Counters {
	starts: Arc<AtomicUsize>,
	stops: Arc<AtomicUsize>,
}

fn echo(restart: ActorRestartPolicy) -> (ActorHandle<i32, (u64, i32)>, Counters) {
	let starts = Arc::new(AtomicUsize::new(0));
	let stops = Arc::new(AtomicUsize::new(0));
	let counters = Counters { starts: Arc::clone(&starts), stops: Arc::clone(&stops) };
	let spec = ActorSpec::new("echo", TaskClass::Interactive, move || Echo { starts: Arc::clone(&starts), stops: Arc::clone(&stops) })
		.mailbox(ActorMailboxSpec { capacity: 4 })
		.supervisor(ActorSupervisorSpec { restart, event_buffer: 16 });
	(spawn_supervised_actor(spec), counters)
}

#[tokio::test]
async fn commands_are_handled_in_order() {
	let (handle, counters) = echo(ActorRestartPolicy::Never);
	let mut events = handle.subscribe();
	for n in 1..=3 {
		handle.send(n).await.unwrap();
	}
	for n in 1..=3 {
		assert_eq!(events.recv().await.unwrap(), (1, n));
	}

	handle.send(0).await.unwrap();
	assert_eq!(events.recv().await.unwrap(), (1, 0));
	assert_eq!(handle.join().await, Some(ActorExit::Stopped));
	assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
	assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failure_restarts_with_fresh_generation() {
	let (handle, counters) = echo(ActorRestartPolicy::OnFailure { max_restarts: 1, backoff: Duration::from_millis(10) });
	let mut events = handle.subscribe();

	handle.send(-1).await.unwrap();
	assert_eq!(events.recv().await.unwrap(), (1, -1));
	handle.send(5).await.unwrap();
	assert_eq!(events.recv().await.unwrap(), (2, 5));
	assert_eq!(handle.generation(), 2);

	// Budget spent: the second failure keeps the actor down.
	handle.send(-2).await.unwrap();
	assert_eq!(events.recv().await.unwrap(), (2, -2));
	assert_eq!(handle.join().await, Some(ActorExit::HandlerFailed("negative: -2".to_string())));
	assert_eq!(counters.starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stop_is_not_restarted() {
	let (handle, counters) = echo(ActorRestartPolicy::OnFailure { max_restarts: 5, backoff: Duration::ZERO });
	handle.send(0).await.unwrap();
	assert_eq!(handle.join().await, Some(ActorExit::Stopped));
	assert!(handle.is_closed());
	assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
}

struct Parked;

#[async_trait]
impl WorkerActor for Parked {
	type Cmd = oneshot::Sender<()>;
	type Evt = ();

	async fn handle(&mut self, _reply: Self::Cmd, _ctx: &mut ActorContext<()>) -> Result<ActorFlow, String> {
		std::future::pending::<()>().await;
		Ok(ActorFlow::Continue)
	}
}

#[tokio::test]
async fn cancel_drops_in_flight_and_queued_replies() {
	let handle = spawn_supervised_actor(ActorSpec::new("parked", TaskClass::Interactive, || Parked));
	let (busy_tx, busy_rx) = oneshot::channel();
	let (queued_tx, queued_rx) = oneshot::channel();
	handle.send(busy_tx).await.unwrap();
	handle.send(queued_tx).await.unwrap();
	tokio::task::yield_now().await;

	handle.cancel();
	assert!(handle.is_closed());
	assert!(busy_rx.await.is_err());
	assert!(queued_rx.await.is_err());
	assert_eq!(handle.shutdown().await, Some(ActorExit::Cancelled));
	assert!(handle.send(oneshot::channel().0).await.is_err());
}

struct Bomb;

#[async_trait]
impl WorkerActor for Bomb {
	type Cmd = ();
	type Evt = ();

	async fn handle(&mut self, _cmd: (), _ctx: &mut ActorContext<()>) -> Result<ActorFlow, String> {
		panic!("boom");
	}
}

#[tokio::test]
async fn panic_is_reported_as_failure() {
	let spec = ActorSpec::new("bomb", TaskClass::Background, || Bomb).supervisor(ActorSupervisorSpec {
		restart: ActorRestartPolicy::Never,
		event_buffer: 1,
	});
	let handle = spawn_supervised_actor(spec);
	handle.send(()).await.unwrap();

	let exit = handle.join().await;
	assert_eq!(exit, Some(ActorExit::Panicked));
	assert!(exit.is_some_and(|exit| exit.is_failure()));
}
