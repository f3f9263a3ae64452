//! Value model, JSON codec and wire protocol for the shard RPC boundary.
//!
//! * [`Value`] / [`Document`]: the closed domain value tree, including
//!   [`ObjectId`] and millisecond [`DateTime`] values that plain JSON cannot carry.
//! * [`codec`]: the tagged JSON encoding (`{"$oid": ..}`, `{"$date": ..}`) used
//!   on the wire.
//! * [`RpcPayload`] / [`OperationKind`]: the `{col, op, args}` request shape.

#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod oid;
pub mod protocol;
pub mod value;

pub use error::{ProtocolError, Result};
pub use oid::{ObjectId, ObjectIdError};
pub use protocol::{OperationKind, RpcPayload, RpcResponse};
pub use value::{DateTime, Document, Value};
