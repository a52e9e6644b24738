//! Trusted dealer: splits a fresh signing key into shares.
//!
//! The node never runs this; it exists for the coordinator side and for the
//! test suites.

use crate::{keys::EcdsaKeyMeta, polynomial::Polynomial, EcdsaKeyShare};
use generic_ec::{curves::Secp256k1, Point, Scalar};
use rand::rngs::OsRng;

/// Deal a fresh random key into `meta.parties` shares.
///
/// Returns the shares (1-based indices) and the group public key the init
/// exchange will arrive at.
pub fn deal_shares(meta: &EcdsaKeyMeta) -> (Vec<EcdsaKeyShare>, Point<Secp256k1>) {
    let mut rng = OsRng;
    let secret = Scalar::random(&mut rng);
    let sharing = Polynomial::random(meta.threshold, Some(secret));
    let shares = (1..=meta.parties)
        .map(|index| EcdsaKeyShare::new(index, sharing.evaluate(index), Scalar::random(&mut rng)))
        .collect();
    let public_key = Point::generator().to_point() * &secret;
    (shares, public_key)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::polynomial::interpolate_scalars_at_zero;

    #[test]
    fn shares_recombine_to_the_dealt_key() {
        let meta = EcdsaKeyMeta::new(5, 2).unwrap();
        let (shares, public_key) = deal_shares(&meta);
        assert_eq!(shares.len(), 5);
        let points: Vec<_> = shares.iter().map(|share| (share.index, share.secret_share)).collect();
        let secret = interpolate_scalars_at_zero(&points).unwrap();
        assert_eq!(Point::generator().to_point() * &secret, public_key);
    }

    #[test]
    fn transport_secrets_are_distinct() {
        let meta = EcdsaKeyMeta::new(3, 1).unwrap();
        let (shares, _) = deal_shares(&meta);
        assert_ne!(shares[0].transport_secret, shares[1].transport_secret);
    }
}
