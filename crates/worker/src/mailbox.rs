//! Bounded actor mailbox.
//!
//! Senders wait for room instead of dropping, so a request routed to a
//! coordinator is never silently lost. Closing wakes every parked sender and
//! receiver; queued messages can still be received after close.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// The mailbox was closed before the message could be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSendError;

impl std::fmt::Display for MailboxSendError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("mailbox closed")
	}
}

impl std::error::Error for MailboxSendError {}

struct Shared<T> {
	capacity: usize,
	queue: Mutex<(VecDeque<T>, bool)>,
	readable: Notify,
	writable: Notify,
}

/// Creates a mailbox holding at most `capacity` queued messages. A zero
/// capacity is treated as one.
pub fn mailbox<T>(capacity: usize) -> (MailboxSender<T>, MailboxReceiver<T>) {
	let capacity = capacity.max(1);
	let shared = Arc::new(Shared {
		capacity,
		queue: Mutex::new((VecDeque::with_capacity(capacity), false)),
		readable: Notify::new(),
		writable: Notify::new(),
	});
	(MailboxSender { shared: Arc::clone(&shared) }, MailboxReceiver { shared })
}

/// Cloneable sending half.
pub struct MailboxSender<T> {
	shared: Arc<Shared<T>>,
}

impl<T> Clone for MailboxSender<T> {
	fn clone(&self) -> Self {
		Self { shared: Arc::clone(&self.shared) }
	}
}

impl<T> MailboxSender<T> {
	/// Queues `msg`, waiting while the mailbox is full.
	pub async fn send(&self, msg: T) -> Result<(), MailboxSendError> {
		loop {
			// Registered before the capacity check so a concurrent pop is not missed.
			let writable = self.shared.writable.notified();
			{
				let mut guard = self.shared.queue.lock();
				let (queue, closed) = &mut *guard;
				if *closed {
					return Err(MailboxSendError);
				}
				if queue.len() < self.shared.capacity {
					queue.push_back(msg);
					drop(guard);
					self.shared.readable.notify_one();
					return Ok(());
				}
			}
			writable.await;
		}
	}

	/// Rejects every later send and wakes parked receivers.
	pub fn close(&self) {
		self.shared.queue.lock().1 = true;
		self.shared.readable.notify_waiters();
		self.shared.writable.notify_waiters();
	}

	pub fn is_closed(&self) -> bool {
		self.shared.queue.lock().1
	}

	/// Messages queued and not yet received.
	pub fn len(&self) -> usize {
		self.shared.queue.lock().0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Receiving half. Clones share one queue; each message goes to one receiver.
pub struct MailboxReceiver<T> {
	shared: Arc<Shared<T>>,
}

impl<T> Clone for MailboxReceiver<T> {
	fn clone(&self) -> Self {
		Self { shared: Arc::clone(&self.shared) }
	}
}

impl<T> MailboxReceiver<T> {
	/// Next message, or `None` once the mailbox is closed and empty.
	pub async fn recv(&self) -> Option<T> {
		loop {
			let readable = self.shared.readable.notified();
			{
				let mut guard = self.shared.queue.lock();
				let (queue, closed) = &mut *guard;
				if let Some(msg) = queue.pop_front() {
					drop(guard);
					self.shared.writable.notify_one();
					return Some(msg);
				}
				if *closed {
					return None;
				}
			}
			readable.await;
		}
	}

	/// Drops everything queued and returns how many messages were dropped.
	pub fn clear(&self) -> usize {
		let dropped: Vec<T> = self.shared.queue.lock().0.drain(..).collect();
		self.shared.writable.notify_waiters();
		dropped.len()
	}
}
