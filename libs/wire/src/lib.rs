//! Wire-level message model shared by the node and the coordinator.
//!
//! A message travels as a multipart frame: five header segments
//! (`from`, `response_of`, `id`, type byte, error byte) followed by zero or
//! more opaque data segments. [Message] is the decoded value,
//! [MessageType][crate::MessageType] enumerates the request taxonomy and its
//! per-direction data arities, and [ErrorCode][crate::ErrorCode] is the
//! one-byte status carried in every reply.

#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::unimplemented,
    clippy::todo
)]

pub mod errors;
pub mod message;
pub mod types;

pub use errors::ErrorCode;
pub use message::{Message, ParseMessageError, ResponseMismatch};
pub use types::MessageType;
