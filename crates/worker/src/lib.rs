//! Actor runtime primitives for long-lived shard coordinators.
//!
//! * [`spawn`]: classified task spawning on the ambient tokio runtime
//! * [`mailbox`]: bounded backpressure mailbox feeding one actor
//! * [`spawn_supervised_actor`]: supervision loop with restart policy
//! * [`Alarm`]: durable single-slot wake timer owned by the host, not the actor
//! * [`WorkerRegistry`]: per-name incarnation history

mod alarm;
mod class;
mod mailbox;
mod registry;
mod spawn;
mod supervisor;

pub use alarm::{Alarm, AlarmError};
pub use class::TaskClass;
pub use mailbox::{MailboxReceiver, MailboxSendError, MailboxSender, mailbox};
pub use registry::{WorkerRecord, WorkerRegistry};
pub use spawn::spawn;
pub use supervisor::{
	ActorContext, ActorExit, ActorFlow, ActorHandle, ActorMailboxSpec, ActorRestartPolicy, ActorSpec, ActorSupervisorSpec, WorkerActor,
	spawn_supervised_actor,
};

/// Receiver for actor-emitted events.
pub type ActorEventReceiver<Evt> = tokio::sync::broadcast::Receiver<Evt>;
