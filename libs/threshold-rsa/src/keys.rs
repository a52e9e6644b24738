//! Key share and public meta types.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// The RSA public key of the threshold group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaPublicKey {
    /// The modulus `n`.
    pub modulus: BigUint,
    /// The public exponent `e`.
    pub exponent: BigUint,
}

impl RsaPublicKey {
    /// Length of the modulus in octets; signatures and padded digests have
    /// this length.
    pub fn modulus_len(&self) -> usize {
        ((self.modulus.bits() + 7) / 8) as usize
    }
}

/// Public parameters of a threshold RSA key group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaKeyMeta {
    /// The group's RSA public key.
    pub public_key: RsaPublicKey,
    /// Number of shares needed to combine a signature.
    pub threshold: u16,
    /// Number of dealt shares.
    pub parties: u16,
    /// The base verification key `v`.
    pub verification_key: BigUint,
    /// Per-share verification keys `v_i = v^{s_i}`, indexed by share.
    pub share_verification_keys: Vec<BigUint>,
}

impl RsaKeyMeta {
    /// The verification key of the share with the given 1-based index.
    pub fn share_verification_key(&self, index: u16) -> Option<&BigUint> {
        if index == 0 {
            return None;
        }
        self.share_verification_keys.get(usize::from(index) - 1)
    }
}

/// One holder's private share of the split RSA exponent.
#[derive(Clone, Serialize, Deserialize)]
pub struct RsaKeyShare {
    /// 1-based share index.
    pub index: u16,
    pub(crate) secret: BigUint,
}

impl RsaKeyShare {
    /// Build a share from raw parts. Mostly useful to dealers.
    pub fn new(index: u16, secret: BigUint) -> Self {
        Self { index, secret }
    }
}

// The secret exponent share stays out of Debug output.
impl std::fmt::Debug for RsaKeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKeyShare").field("index", &self.index).finish_non_exhaustive()
    }
}

impl PartialEq for RsaKeyShare {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.secret == other.secret
    }
}

impl Eq for RsaKeyShare {}
