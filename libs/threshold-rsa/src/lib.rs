//! Threshold RSA signing.
//!
//! An RSA private exponent is split by a trusted dealer into additive-style
//! polynomial shares (Shoup's scheme). Each holder can produce a *signature
//! share* over a prepared digest together with a proof of correctness; any
//! party holding the public meta can verify a share without seeing the
//! private material. Combination of shares into a full RSA signature is the
//! coordinator's job and is out of scope here.

pub mod dealer;
pub mod keys;
mod math;
pub mod pkcs1;
pub mod signature;

pub use dealer::{deal_shares, generate_safe_prime, DealError};
pub use keys::{RsaKeyMeta, RsaKeyShare, RsaPublicKey};
pub use signature::{RsaSigShare, SignError, VerifyError};
