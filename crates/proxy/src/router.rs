//! Shard key to coordinator instance mapping.

use rand::Rng;

use crate::coordinator::CoordinatorStub;
use crate::namespace::CoordinatorNamespace;

/// Value that pins an operation to one shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShardKey {
	Str(String),
	Num(i64),
}

impl From<&str> for ShardKey {
	fn from(value: &str) -> Self {
		Self::Str(value.to_string())
	}
}

impl From<String> for ShardKey {
	fn from(value: String) -> Self {
		Self::Str(value)
	}
}

impl From<i64> for ShardKey {
	fn from(value: i64) -> Self {
		Self::Num(value)
	}
}

impl From<i32> for ShardKey {
	fn from(value: i32) -> Self {
		Self::Num(i64::from(value))
	}
}

impl From<u32> for ShardKey {
	fn from(value: u32) -> Self {
		Self::Num(i64::from(value))
	}
}

/// 32-bit polynomial string hash over UTF-16 code units: `h = h * 31 + unit`,
/// wrapping at every step.
pub fn string_hash(key: &str) -> i32 {
	key.encode_utf16().fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Shard index for `key` among `shards` instances.
///
/// Numeric and non-empty string keys map deterministically. No key, or an
/// empty string, picks a shard uniformly at random.
pub fn shard_index(key: Option<&ShardKey>, shards: u32) -> u32 {
	let shards = shards.max(1);
	let magnitude = match key {
		Some(ShardKey::Num(n)) => n.unsigned_abs(),
		Some(ShardKey::Str(s)) if !s.is_empty() => u64::from(string_hash(s).unsigned_abs()),
		_ => return rand::rng().random_range(0..shards),
	};
	(magnitude % u64::from(shards)) as u32
}

/// Resolves shard keys to coordinator stubs.
#[derive(Clone)]
pub struct ShardRouter {
	shards: u32,
	prefix: String,
	namespace: CoordinatorNamespace,
}

impl ShardRouter {
	pub fn new(shards: u32, prefix: impl Into<String>, namespace: CoordinatorNamespace) -> Self {
		Self { shards: shards.max(1), prefix: prefix.into(), namespace }
	}

	pub fn shards(&self) -> u32 {
		self.shards
	}

	pub fn route(&self, key: Option<&ShardKey>) -> u32 {
		shard_index(key, self.shards)
	}

	/// Coordinator instance name for a shard index.
	pub fn instance_name(&self, index: u32) -> String {
		format!("{}{index}", self.prefix)
	}

	/// A new stub for the coordinator owning `key`. Stubs are cheap and never
	/// cached here: each caller resolves its own.
	pub fn resolve(&self, key: Option<&ShardKey>) -> CoordinatorStub {
		let index = self.route(key);
		let name = self.instance_name(index);
		tracing::trace!(shard = index, instance = %name, "router.resolve");
		self.namespace.stub(name)
	}

	pub fn namespace(&self) -> &CoordinatorNamespace {
		&self.namespace
	}
}
