//! Sharded document-database proxy.
//!
//! A [`Database`] hands out [`Collection`]s. In sharded mode each collection
//! is bound to one shard coordinator chosen by [`ShardRouter`] from a
//! [`ShardKey`]; calls travel to it as [`RpcPayload`](docshard_rpc::RpcPayload)s
//! and come back as tagged JSON. Coordinators live in a
//! [`CoordinatorNamespace`], which creates them by name on first use and
//! keeps each one's keep-alive alarm across evictions.
//!
//! With [`ProxyConfig::dev_direct`] set, collections skip routing and the wire
//! form and run against one store connection directly.

mod client;
mod config;
mod coordinator;
mod cursor;
mod error;
mod namespace;
mod router;

pub use client::{Collection, Database, DirectTransport, ShardTransport, TransactionStep, Transport};
pub use config::{HeartbeatConfig, MailboxConfig, ProxyConfig};
pub use coordinator::{CoordinatorEvent, CoordinatorStub};
pub use cursor::{AggregateCursor, FindCursor};
pub use docshard_store::Outcome;
pub use error::{ConfigError, Error, Result};
pub use namespace::CoordinatorNamespace;
pub use router::{ShardKey, ShardRouter, shard_index, string_hash};
