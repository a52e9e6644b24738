//! Interactive threshold ECDSA signing over secp256k1.
//!
//! A key is Shamir-shared by a trusted dealer; each holder keeps one
//! [EcdsaKeyShare]. Before the group can sign, the holders run a one-shot
//! init exchange ([EcdsaKeyShare::init] / [EcdsaKeyShare::set_key]) that
//! installs the group public key and every member's commitment and
//! transport key into each share.
//!
//! Signing a digest is a three-round broadcast protocol plus a final
//! combine step, driven per holder through the session typestates
//! [SessionRound1] → [SessionRound2] → [SessionRound3] →
//! [EcdsaSignature]. Per-signature nonce and mask polynomials are dealt
//! with Feldman commitments; the cross-holder share transfer rides inside
//! the broadcast messages, sealed to each recipient with a pairwise
//! authenticated cipher. The honest-majority bound `parties >= 2*threshold
//! + 1` is what lets the product shares interpolate.

pub mod dealer;
pub mod keys;
mod polynomial;
mod sealed;
pub mod session;
pub mod signature;
mod util;
mod zk;

pub use dealer::deal_shares;
pub use keys::{EcdsaKeyMeta, EcdsaKeyShare, GroupPublic, KeyError, KeyInitMessage, MemberPublic, MetaError};
pub use polynomial::InterpolationError;
pub use session::{
    Round1Message, Round2Message, Round3Message, SessionRound1, SessionRound2, SessionRound3, SigningError,
};
pub use signature::EcdsaSignature;
pub use util::RosterError;
