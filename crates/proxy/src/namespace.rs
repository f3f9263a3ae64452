//! Host platform for coordinators.
//!
//! A [`CoordinatorNamespace`] instantiates coordinators by name on first use,
//! may evict them at any time, and keeps one durable alarm slot per name. The
//! alarm outlives evictions: a wake that fires while its coordinator is gone
//! recreates the coordinator and delivers the wake to the new incarnation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use docshard_store::StoreConnector;
use docshard_worker::{
	ActorEventReceiver, ActorHandle, ActorMailboxSpec, ActorSpec, ActorSupervisorSpec, Alarm, MailboxSender, TaskClass, WorkerRegistry,
	spawn_supervised_actor,
};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::ProxyConfig;
use crate::coordinator::{Command, Coordinator, CoordinatorEvent, CoordinatorSettings, CoordinatorStub};

type CoordinatorHandle = ActorHandle<Command, CoordinatorEvent>;

struct NamespaceInner {
	connector: Arc<dyn StoreConnector>,
	settings: Arc<CoordinatorSettings>,
	instances: Mutex<HashMap<String, CoordinatorHandle>>,
	alarms: Mutex<HashMap<String, Alarm>>,
	registry: WorkerRegistry,
	closed: AtomicBool,
}

impl Drop for NamespaceInner {
	fn drop(&mut self) {
		for alarm in self.alarms.get_mut().values() {
			alarm.close();
		}
	}
}

/// Named coordinator instances plus their alarm slots.
///
/// Cheap to clone; clones share the same instances.
#[derive(Clone)]
pub struct CoordinatorNamespace {
	inner: Arc<NamespaceInner>,
}

impl CoordinatorNamespace {
	/// Coordinators created here connect through `connector` using the
	/// database, pool, heartbeat and mailbox settings of `config`.
	pub fn new(connector: Arc<dyn StoreConnector>, config: &ProxyConfig) -> Self {
		let settings = CoordinatorSettings {
			database: config.database.clone(),
			pool: config.pool,
			heartbeat: config.heartbeat,
			mailbox_capacity: config.mailbox.capacity,
		};
		Self {
			inner: Arc::new(NamespaceInner {
				connector,
				settings: Arc::new(settings),
				instances: Mutex::new(HashMap::new()),
				alarms: Mutex::new(HashMap::new()),
				registry: WorkerRegistry::new(),
				closed: AtomicBool::new(false),
			}),
		}
	}

	/// Stub addressing the instance called `name`. Creates nothing until the
	/// stub is first used.
	pub fn stub(&self, name: impl Into<String>) -> CoordinatorStub {
		CoordinatorStub::new(name.into(), self.clone())
	}

	/// Mailbox of the live instance called `name`, creating the instance if
	/// needed. `None` once the namespace was shut down.
	pub(crate) fn sender(&self, name: &str) -> Option<MailboxSender<Command>> {
		if self.inner.closed.load(Ordering::Acquire) {
			return None;
		}
		let mut instances = self.inner.instances.lock();
		if let Some(handle) = instances.get(name)
			&& !handle.is_closed()
		{
			return Some(handle.sender());
		}
		let handle = self.spawn(name);
		let sender = handle.sender();
		instances.insert(name.to_string(), handle);
		Some(sender)
	}

	fn spawn(&self, name: &str) -> CoordinatorHandle {
		let incarnation = self.inner.registry.record_start(name, TaskClass::Interactive);
		tracing::info!(instance = name, incarnation, "namespace.instance.create");

		let alarm = self.alarm(name);
		let connector = Arc::clone(&self.inner.connector);
		let settings = Arc::clone(&self.inner.settings);
		let capacity = settings.mailbox_capacity;
		let actor_name = name.to_string();
		let spec = ActorSpec::new(name, TaskClass::Interactive, move || {
			Coordinator::new(actor_name.clone(), Arc::clone(&connector), Arc::clone(&settings), alarm.clone())
		})
		.mailbox(ActorMailboxSpec { capacity })
		.supervisor(ActorSupervisorSpec::default());
		spawn_supervised_actor(spec)
	}

	/// Alarm slot for `name`, created empty on first use.
	pub(crate) fn alarm(&self, name: &str) -> Alarm {
		let mut alarms = self.inner.alarms.lock();
		alarms
			.entry(name.to_string())
			.or_insert_with(|| {
				let host = Arc::downgrade(&self.inner);
				let target = name.to_string();
				Alarm::new(format!("{name}.heartbeat"), TaskClass::Background, move || deliver_wake(host.clone(), target.clone()))
			})
			.clone()
	}

	/// Pending keep-alive wake for `name`, if any.
	pub fn pending_wake(&self, name: &str) -> Option<Instant> {
		self.inner.alarms.lock().get(name).and_then(Alarm::get)
	}

	/// Whether an instance called `name` is currently alive.
	pub fn is_live(&self, name: &str) -> bool {
		self.inner.instances.lock().get(name).is_some_and(|handle| !handle.is_closed())
	}

	/// Names of live instances, sorted.
	pub fn live_instances(&self) -> Vec<String> {
		let mut names: Vec<_> = self.inner.instances.lock().iter().filter(|(_, h)| !h.is_closed()).map(|(n, _)| n.clone()).collect();
		names.sort();
		names
	}

	/// Drops the instance called `name`, as the host does with idle
	/// instances. Its alarm slot is kept. Returns whether an instance existed.
	pub fn evict(&self, name: &str) -> bool {
		let Some(handle) = self.inner.instances.lock().remove(name) else {
			return false;
		};
		handle.cancel();
		self.inner.registry.record_exit(name, "evicted");
		tracing::info!(instance = name, "namespace.instance.evict");
		// A wake queued in the dropped mailbox is lost with it.
		self.ensure_wake(name);
		true
	}

	/// Arms the keep-alive wake for `name` one interval out unless one is
	/// already pending.
	fn ensure_wake(&self, name: &str) {
		if self.inner.closed.load(Ordering::Acquire) {
			return;
		}
		let alarm = self.alarm(name);
		if alarm.get().is_some() {
			return;
		}
		match alarm.set_after(self.inner.settings.heartbeat.interval()) {
			Ok(()) => tracing::debug!(instance = name, "namespace.alarm.rearm"),
			Err(error) if alarm.is_closed() => tracing::debug!(instance = name, %error, "namespace.alarm.closed"),
			Err(error) => tracing::error!(instance = name, %error, "namespace.alarm.rearm_failed"),
		}
	}

	/// Event stream of the instance called `name`, creating it if needed.
	pub fn subscribe(&self, name: &str) -> Option<ActorEventReceiver<CoordinatorEvent>> {
		self.sender(name)?;
		self.inner.instances.lock().get(name).map(ActorHandle::subscribe)
	}

	/// Creation and exit history per instance name.
	pub fn registry(&self) -> &WorkerRegistry {
		&self.inner.registry
	}

	/// Closes every alarm and stops every instance. Later calls through any
	/// stub fail with [`Error::CoordinatorUnavailable`](crate::Error::CoordinatorUnavailable).
	pub async fn shutdown(&self) {
		self.inner.closed.store(true, Ordering::Release);
		for alarm in self.inner.alarms.lock().values() {
			alarm.close();
		}
		let handles: Vec<_> = self.inner.instances.lock().drain().collect();
		for (name, handle) in handles {
			handle.shutdown().await;
			self.inner.registry.record_exit(&name, "shutdown");
		}
		tracing::debug!("namespace.shutdown");
	}
}

/// Alarm callback: hands the wake to the named instance, recreating it when
/// it was evicted.
async fn deliver_wake(host: Weak<NamespaceInner>, target: String) {
	let Some(inner) = host.upgrade() else {
		return;
	};
	let namespace = CoordinatorNamespace { inner };
	// The instance can be evicted between resolving its mailbox and sending,
	// so a refused wake gets one more try against a fresh incarnation.
	for attempt in 1..=2 {
		if !namespace.is_live(&target) {
			tracing::info!(instance = %target, "namespace.alarm.recreate");
		}
		let Some(sender) = namespace.sender(&target) else {
			return;
		};
		if sender.send(Command::Wake).await.is_ok() {
			return;
		}
		tracing::warn!(instance = %target, attempt, "namespace.alarm.undelivered");
	}
	tracing::error!(instance = %target, "namespace.alarm.keepalive_lost");
	namespace.ensure_wake(&target);
}
