//! Driver surface for the document store behind each shard.
//!
//! A coordinator talks to its database through [`DocumentStore`], obtained
//! from a [`StoreConnector`]. Data operations are the typed [`Operation`]
//! values; their results are [`Outcome`]s. Both convert to and from the
//! positional JSON form carried by [`RpcPayload`](docshard_rpc::RpcPayload).
//!
//! [`memory`] provides the in-process store used by the proxy when no
//! external server is configured, and by tests.

pub mod error;
pub mod memory;
mod operation;
pub mod options;
mod results;
mod session;
mod store;

pub use error::{Result, StoreError};
pub use memory::{MemoryConnector, MemoryStore};
pub use operation::Operation;
pub use results::{DeleteResult, InsertManyResult, InsertOneResult, Outcome, UpdateResult};
pub use session::{ReadConcern, SessionId, TransactionOptions};
pub use store::{DocumentStore, PoolOptions, StoreConnector, Transaction};
