//! Binary codec for key material and protocol round messages.
//!
//! Every payload that crosses the wire or lands in the config file goes
//! through [encode]/[decode]: key shares, key metas, signature shares,
//! init messages, round messages and their lists.

#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::unimplemented,
    clippy::todo
)]

pub mod codec;

pub use codec::{decode, encode, DecodeError, EncodeError};
