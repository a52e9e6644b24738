//! Signature shares: production and verification.

use crate::{
    keys::{RsaKeyMeta, RsaKeyShare},
    math::factorial,
    pkcs1::{self, PaddingError},
};
use num_bigint::{BigUint, RandBigInt};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Extra random bits blinding the proof response beyond the modulus size.
const PROOF_BLINDING_BITS: u64 = 2 * 256;

/// One holder's contribution to a threshold RSA signature.
///
/// Carries the share value `x_i = x^{2Δs_i}` together with a proof of
/// discrete-log equality binding it to the holder's verification key, so the
/// coordinator can weed out bad contributions before combining.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsaSigShare {
    /// 1-based index of the producing share.
    pub index: u16,
    /// The signature share value.
    pub share: BigUint,
    /// Fiat-Shamir challenge of the correctness proof.
    pub challenge: BigUint,
    /// Response of the correctness proof.
    pub response: BigUint,
}

/// A signature share could not be produced.
#[derive(Debug, Error)]
pub enum SignError {
    /// The digest could not be padded for this modulus.
    #[error(transparent)]
    Padding(#[from] PaddingError),
    /// The share index has no verification key in the meta.
    #[error("share index {0} out of range for this key group")]
    IndexOutOfRange(u16),
}

/// A signature share failed verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The digest could not be padded for this modulus.
    #[error(transparent)]
    Padding(#[from] PaddingError),
    /// The share index has no verification key in the meta.
    #[error("share index {0} out of range for this key group")]
    IndexOutOfRange(u16),
    /// A proof term is not invertible mod n; the share is garbage.
    #[error("share contains a non-invertible value")]
    NotInvertible,
    /// The correctness proof does not check out.
    #[error("proof of correctness failed")]
    BadProof,
}

impl RsaKeyShare {
    /// Produce a signature share over a SHA-256 document digest.
    ///
    /// The digest is padded with EMSA-PKCS1-v1_5 for the group modulus and
    /// raised to `2Δs_i`, with Δ the factorial of the group size. The proof
    /// is the standard discrete-log-equality argument over the verification
    /// keys in `meta`.
    pub fn sign(&self, digest: &[u8], meta: &RsaKeyMeta) -> Result<RsaSigShare, SignError> {
        let n = &meta.public_key.modulus;
        let vk = meta.share_verification_key(self.index).ok_or(SignError::IndexOutOfRange(self.index))?;

        let em = pkcs1::emsa_encode(digest, meta.public_key.modulus_len())?;
        let x = BigUint::from_bytes_be(&em);

        let delta = factorial(meta.parties);
        let two_delta_si = &delta * 2u32 * &self.secret;
        let share = x.modpow(&two_delta_si, n);

        // Proof that log_v(v_i) == log_{x^{4Δ}}(x_i^2).
        let x_tilde = x.modpow(&(&delta * 4u32), n);
        let share_sq = share.modpow(&BigUint::from(2u32), n);
        let r = OsRng.gen_biguint(n.bits() + PROOF_BLINDING_BITS);
        let v_commitment = meta.verification_key.modpow(&r, n);
        let x_commitment = x_tilde.modpow(&r, n);
        let challenge = proof_challenge(&meta.verification_key, &x_tilde, vk, &share_sq, &v_commitment, &x_commitment);
        let response = &self.secret * &challenge + r;

        Ok(RsaSigShare { index: self.index, share, challenge, response })
    }
}

impl RsaSigShare {
    /// Verify this share against the group meta and the document digest it
    /// claims to sign.
    pub fn verify(&self, digest: &[u8], meta: &RsaKeyMeta) -> Result<(), VerifyError> {
        let n = &meta.public_key.modulus;
        let vk = meta.share_verification_key(self.index).ok_or(VerifyError::IndexOutOfRange(self.index))?;

        let em = pkcs1::emsa_encode(digest, meta.public_key.modulus_len())?;
        let x = BigUint::from_bytes_be(&em);

        let delta = factorial(meta.parties);
        let x_tilde = x.modpow(&(&delta * 4u32), n);
        let share_sq = self.share.modpow(&BigUint::from(2u32), n);

        // v^z * v_i^{-c} and x~^z * x_i^{-2c} reproduce the commitments
        // exactly when z = s_i c + r.
        let vk_inv = vk.modinv(n).ok_or(VerifyError::NotInvertible)?;
        let share_inv = self.share.modinv(n).ok_or(VerifyError::NotInvertible)?;
        let v_commitment =
            meta.verification_key.modpow(&self.response, n) * vk_inv.modpow(&self.challenge, n) % n;
        let x_commitment = x_tilde.modpow(&self.response, n)
            * share_inv.modpow(&(&self.challenge * 2u32), n)
            % n;

        let expected = proof_challenge(&meta.verification_key, &x_tilde, vk, &share_sq, &v_commitment, &x_commitment);
        if expected == self.challenge { Ok(()) } else { Err(VerifyError::BadProof) }
    }
}

fn proof_challenge(
    v: &BigUint,
    x_tilde: &BigUint,
    vk: &BigUint,
    share_sq: &BigUint,
    v_commitment: &BigUint,
    x_commitment: &BigUint,
) -> BigUint {
    let mut hasher = Sha256::new();
    for value in [v, x_tilde, vk, share_sq, v_commitment, x_commitment] {
        let bytes = value.to_bytes_be();
        hasher.update((bytes.len() as u32).to_be_bytes());
        hasher.update(&bytes);
    }
    BigUint::from_bytes_be(&hasher.finalize())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dealer::{deal_shares, generate_safe_prime};
    use num_traits::One;
    use std::sync::OnceLock;

    const TEST_PRIME_BITS: u64 = 256;

    fn dealt() -> &'static (Vec<RsaKeyShare>, RsaKeyMeta) {
        static DEALT: OnceLock<(Vec<RsaKeyShare>, RsaKeyMeta)> = OnceLock::new();
        DEALT.get_or_init(|| {
            let p = generate_safe_prime(TEST_PRIME_BITS);
            let q = generate_safe_prime(TEST_PRIME_BITS);
            deal_shares(&p, &q, 3, 5).unwrap()
        })
    }

    fn digest(content: &[u8]) -> Vec<u8> {
        Sha256::digest(content).to_vec()
    }

    #[test]
    fn sign_and_verify() {
        let (shares, meta) = dealt();
        let digest = digest(b"a document worth signing");
        for share in shares {
            let sig_share = share.sign(&digest, meta).unwrap();
            assert_eq!(sig_share.index, share.index);
            sig_share.verify(&digest, meta).unwrap();
        }
    }

    #[test]
    fn tampered_share_fails_verification() {
        let (shares, meta) = dealt();
        let digest = digest(b"a document worth signing");
        let mut sig_share = shares[0].sign(&digest, meta).unwrap();
        sig_share.share += BigUint::one();
        assert!(matches!(sig_share.verify(&digest, meta), Err(VerifyError::BadProof)));
    }

    #[test]
    fn share_does_not_verify_for_other_document() {
        let (shares, meta) = dealt();
        let sig_share = shares[1].sign(&digest(b"first"), meta).unwrap();
        assert!(matches!(sig_share.verify(&digest(b"second"), meta), Err(VerifyError::BadProof)));
    }

    #[test]
    fn wrong_index_is_rejected() {
        let (shares, meta) = dealt();
        let digest = digest(b"doc");
        let mut sig_share = shares[0].sign(&digest, meta).unwrap();
        sig_share.index = 40;
        assert!(matches!(sig_share.verify(&digest, meta), Err(VerifyError::IndexOutOfRange(40))));
    }

    #[test]
    fn short_digest_is_rejected() {
        let (shares, meta) = dealt();
        assert!(matches!(shares[0].sign(&[0u8; 16], meta), Err(SignError::Padding(_))));
    }
}
