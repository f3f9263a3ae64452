use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::TaskClass;

/// Snapshot for one registered actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRecord {
	pub name: String,
	pub class: TaskClass,
	/// How many times the named actor was created, counting recreation after eviction.
	pub incarnations: u64,
	pub last_exit: Option<String>,
}

/// In-memory worker registry for status snapshots.
#[derive(Debug, Default, Clone)]
pub struct WorkerRegistry {
	inner: Arc<RwLock<HashMap<String, WorkerRecord>>>,
}

impl WorkerRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a fresh incarnation of `name`, creating the record if needed.
	pub fn record_start(&self, name: &str, class: TaskClass) -> u64 {
		let mut guard = self.inner.write();
		let record = guard.entry(name.to_string()).or_insert_with(|| WorkerRecord {
			name: name.to_string(),
			class,
			incarnations: 0,
			last_exit: None,
		});
		record.incarnations = record.incarnations.wrapping_add(1);
		record.incarnations
	}

	/// Records why the current incarnation of `name` went away.
	pub fn record_exit(&self, name: &str, reason: impl Into<String>) {
		if let Some(record) = self.inner.write().get_mut(name) {
			record.last_exit = Some(reason.into());
		}
	}

	/// Returns one record.
	pub fn get(&self, name: &str) -> Option<WorkerRecord> {
		self.inner.read().get(name).cloned()
	}

	/// Returns snapshots sorted by name.
	pub fn snapshots(&self) -> Vec<WorkerRecord> {
		let mut records: Vec<_> = self.inner.read().values().cloned().collect();
		records.sort_by(|a, b| a.name.cmp(&b.name));
		records
	}
}
