//! Durable single-slot wake timer.
//!
//! An [`Alarm`] models host-owned storage for one scheduled wake time plus the
//! callback the host invokes at that time. It outlives any single actor
//! generation: an actor that is evicted and recreated finds its pending wake
//! still armed, and a wake that fires while no instance is alive is delivered
//! through the callback, which is free to recreate one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::TaskClass;

type FireFn = dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync;

/// Error returned when arming an alarm fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmError {
	/// The alarm storage was closed by its owner.
	Closed,
}

impl std::fmt::Display for AlarmError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AlarmError::Closed => write!(f, "alarm storage closed"),
		}
	}
}

impl std::error::Error for AlarmError {}

#[derive(Default)]
struct AlarmSlot {
	wake_at: Option<Instant>,
	timer: Option<CancellationToken>,
	epoch: u64,
	closed: bool,
}

struct AlarmInner {
	name: String,
	class: TaskClass,
	slot: Mutex<AlarmSlot>,
	on_fire: Arc<FireFn>,
}

/// Cloneable handle to one durable wake slot.
#[derive(Clone)]
pub struct Alarm {
	inner: Arc<AlarmInner>,
}

impl std::fmt::Debug for Alarm {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Alarm")
			.field("name", &self.inner.name)
			.field("wake_at", &self.get())
			.finish_non_exhaustive()
	}
}

impl Alarm {
	/// Creates an empty alarm slot whose wakes invoke `on_fire`.
	pub fn new<F, Fut>(name: impl Into<String>, class: TaskClass, on_fire: F) -> Self
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let on_fire: Arc<FireFn> = Arc::new(move || Box::pin(on_fire()));
		Self {
			inner: Arc::new(AlarmInner {
				name: name.into(),
				class,
				slot: Mutex::new(AlarmSlot::default()),
				on_fire,
			}),
		}
	}

	/// Returns the pending wake time, if one is armed.
	pub fn get(&self) -> Option<Instant> {
		self.inner.slot.lock().wake_at
	}

	/// Arms the alarm for `delay` from now, replacing any pending wake.
	pub fn set_after(&self, delay: Duration) -> Result<(), AlarmError> {
		self.set(Instant::now() + delay)
	}

	/// Arms the alarm for `at`, replacing any pending wake.
	///
	/// Must be called from within a tokio runtime.
	pub fn set(&self, at: Instant) -> Result<(), AlarmError> {
		let timer = CancellationToken::new();
		let epoch = {
			let mut slot = self.inner.slot.lock();
			if slot.closed {
				return Err(AlarmError::Closed);
			}
			if let Some(previous) = slot.timer.replace(timer.clone()) {
				previous.cancel();
			}
			slot.wake_at = Some(at);
			slot.epoch = slot.epoch.wrapping_add(1);
			slot.epoch
		};

		let inner = Arc::clone(&self.inner);
		crate::spawn(self.inner.class, async move {
			tokio::select! {
				_ = timer.cancelled() => return,
				_ = tokio::time::sleep_until(at) => {}
			}
			{
				let mut slot = inner.slot.lock();
				if slot.epoch != epoch || slot.closed {
					return;
				}
				slot.wake_at = None;
				slot.timer = None;
			}
			tracing::trace!(alarm = %inner.name, "worker.alarm.fire");
			(inner.on_fire)().await;
		});
		Ok(())
	}

	/// Clears any pending wake without closing the slot.
	pub fn delete(&self) {
		let mut slot = self.inner.slot.lock();
		slot.wake_at = None;
		slot.epoch = slot.epoch.wrapping_add(1);
		if let Some(timer) = slot.timer.take() {
			timer.cancel();
		}
	}

	/// Clears any pending wake and rejects every later [`Alarm::set`].
	pub fn close(&self) {
		self.delete();
		self.inner.slot.lock().closed = true;
	}

	/// Returns true once [`Alarm::close`] was called.
	pub fn is_closed(&self) -> bool {
		self.inner.slot.lock().closed
	}
}
