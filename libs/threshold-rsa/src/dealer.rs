//! Trusted dealer: splits a fresh RSA key into verifiable shares.
//!
//! The node never runs this; it exists for the coordinator side and for the
//! test suites, which need dealt key groups to exercise share signing.

use crate::{
    keys::{RsaKeyMeta, RsaKeyShare, RsaPublicKey},
    math,
};
use num_bigint::{BigUint, RandBigInt};
use num_traits::One;
use rand::rngs::OsRng;
use thiserror::Error;

/// The fixed public exponent.
const PUBLIC_EXPONENT: u32 = 65537;

/// The dealer inputs do not form a usable key group.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DealError {
    /// Threshold must be between 1 and the number of parties.
    #[error("threshold {threshold} invalid for {parties} parties")]
    BadThreshold {
        /// Requested threshold.
        threshold: u16,
        /// Requested group size.
        parties: u16,
    },
    /// The primes must be distinct safe primes.
    #[error("dealer primes must be distinct safe primes")]
    BadPrimes,
    /// The public exponent is not invertible for these primes.
    #[error("public exponent shares a factor with the group order")]
    BadExponent,
}

/// Split an RSA key over the safe primes `p` and `q` into `parties` shares
/// with combination threshold `threshold`.
///
/// Returns the dealt shares (1-based indices) and the public meta the
/// holders verify against.
pub fn deal_shares(
    p: &BigUint,
    q: &BigUint,
    threshold: u16,
    parties: u16,
) -> Result<(Vec<RsaKeyShare>, RsaKeyMeta), DealError> {
    if threshold == 0 || threshold > parties {
        return Err(DealError::BadThreshold { threshold, parties });
    }
    let one = BigUint::one();
    let p_prime = (p - &one) >> 1;
    let q_prime = (q - &one) >> 1;
    if p == q
        || !math::is_probable_prime(p)
        || !math::is_probable_prime(q)
        || !math::is_probable_prime(&p_prime)
        || !math::is_probable_prime(&q_prime)
    {
        return Err(DealError::BadPrimes);
    }

    let n = p * q;
    let m = &p_prime * &q_prime;
    let e = BigUint::from(PUBLIC_EXPONENT);
    let d = e.modinv(&m).ok_or(DealError::BadExponent)?;

    // Random polynomial over Z_m with the private exponent as constant term;
    // share i is the evaluation at i.
    let mut rng = OsRng;
    let mut coefficients = vec![d];
    for _ in 1..threshold {
        coefficients.push(rng.gen_biguint_below(&m));
    }
    let shares: Vec<_> = (1..=parties)
        .map(|index| {
            let secret = math::eval_poly_mod(&coefficients, &BigUint::from(index), &m);
            RsaKeyShare::new(index, secret)
        })
        .collect();

    // v is a random square so it generates the cyclic group of squares with
    // overwhelming probability.
    let u = math::random_coprime(&n);
    let v = &u * &u % &n;
    let share_verification_keys = shares.iter().map(|share| v.modpow(&share.secret, &n)).collect();

    let meta = RsaKeyMeta {
        public_key: RsaPublicKey { modulus: n, exponent: e },
        threshold,
        parties,
        verification_key: v,
        share_verification_keys,
    };
    Ok((shares, meta))
}

/// Generate a random safe prime of the given bit length.
pub fn generate_safe_prime(bits: u64) -> BigUint {
    let mut rng = OsRng;
    loop {
        let mut candidate = rng.gen_biguint(bits);
        candidate.set_bit(bits - 1, true);
        // Force candidate ≡ 3 (mod 4) so (candidate - 1) / 2 is odd.
        candidate.set_bit(0, true);
        candidate.set_bit(1, true);
        let sophie = &candidate >> 1;
        if math::has_small_factor(&candidate) || math::has_small_factor(&sophie) {
            continue;
        }
        if math::is_probable_prime(&candidate) && math::is_probable_prime(&sophie) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_bad_threshold() {
        let p = BigUint::from(23u32);
        let q = BigUint::from(47u32);
        assert_eq!(deal_shares(&p, &q, 0, 3), Err(DealError::BadThreshold { threshold: 0, parties: 3 }));
        assert_eq!(deal_shares(&p, &q, 4, 3), Err(DealError::BadThreshold { threshold: 4, parties: 3 }));
    }

    #[test]
    fn rejects_non_safe_primes() {
        // 13 is prime but (13 - 1) / 2 = 6 is not.
        let p = BigUint::from(13u32);
        let q = BigUint::from(23u32);
        assert_eq!(deal_shares(&p, &q, 2, 3), Err(DealError::BadPrimes));
        assert_eq!(deal_shares(&q, &q, 2, 3), Err(DealError::BadPrimes));
    }

    #[test]
    fn deals_with_tiny_safe_primes() {
        // 23 and 47 are safe primes; far too small for signing but enough to
        // check the dealt structure.
        let p = BigUint::from(23u32);
        let q = BigUint::from(47u32);
        let (shares, meta) = deal_shares(&p, &q, 2, 3).unwrap();
        assert_eq!(shares.len(), 3);
        assert_eq!(meta.share_verification_keys.len(), 3);
        assert_eq!(meta.public_key.modulus, BigUint::from(23u32 * 47));
        for (offset, share) in shares.iter().enumerate() {
            assert_eq!(usize::from(share.index), offset + 1);
        }
    }

    #[test]
    fn generated_safe_prime_is_safe() {
        let p = generate_safe_prime(64);
        assert_eq!(p.bits(), 64);
        assert!(math::is_probable_prime(&p));
        assert!(math::is_probable_prime(&(&p >> 1)));
    }
}
