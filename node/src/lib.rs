//! The threshold signing node.
//!
//! A long-running service holding threshold RSA and ECDSA key shares on
//! behalf of a single trusted coordinator. The coordinator installs and
//! removes key material and drives signing; this node answers one request
//! at a time over a mutually authenticated reply socket and persists every
//! key mutation to its config file.

pub mod handlers;
pub mod keystore;
pub mod node;
pub mod observability;
pub mod transport;
