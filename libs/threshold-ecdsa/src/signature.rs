//! The ECDSA signature pair.

use generic_ec::{coords::AlwaysHasAffineX, curves::Secp256k1, NonZero, Point, Scalar};
use serde::{Deserialize, Serialize};
use std::ops::Neg;

/// An ECDSA signature over secp256k1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaSignature {
    /// The `r` component.
    pub r: NonZero<Scalar<Secp256k1>>,
    /// The `s` component.
    pub s: NonZero<Scalar<Secp256k1>>,
}

impl EcdsaSignature {
    /// Pick the lower of `s` and `-s`.
    ///
    /// `(r, s)` and `(r, -s)` verify equally; emitting the lower half keeps
    /// the output canonical for consumers that reject malleable encodings.
    pub fn normalize_s(self) -> Self {
        let neg_s = self.s.neg();
        if neg_s < self.s { EcdsaSignature { s: neg_s, ..self } } else { self }
    }

    /// Check this signature over `digest` against `public_key`.
    pub fn verify(&self, public_key: &Point<Secp256k1>, digest: &Scalar<Secp256k1>) -> bool {
        let Some(s_inv) = self.s.into_inner().invert() else {
            return false;
        };
        let r = self.r.into_inner();
        let u1 = digest * &s_inv;
        let u2 = &r * &s_inv;
        let candidate = Point::generator().to_point() * &u1 + public_key * &u2;
        match NonZero::from_point(candidate) {
            Some(point) => point.x().to_scalar() == r,
            None => false,
        }
    }
}
