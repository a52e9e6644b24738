//! Schnorr proof of knowledge of a discrete logarithm.

use generic_ec::{curves::Secp256k1, Point, Scalar};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const CHALLENGE_DOMAIN: &[u8] = b"tchsm/schnorr-pok/v1";

/// Non-interactive proof that the prover knows `witness` with
/// `statement = witness * G`, bound to a caller-supplied context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrProof {
    commitment: Point<Secp256k1>,
    response: Scalar<Secp256k1>,
}

impl SchnorrProof {
    /// Prove knowledge of `witness` for `statement = witness * G`.
    pub fn prove(witness: &Scalar<Secp256k1>, statement: &Point<Secp256k1>, context: &[u8]) -> Self {
        let blinding = Scalar::random(&mut OsRng);
        let commitment = Point::generator().to_point() * &blinding;
        let challenge = challenge(context, statement, &commitment);
        let response = blinding + challenge * witness;
        Self { commitment, response }
    }

    /// Check the proof against the statement and context it was made for.
    pub fn verify(&self, statement: &Point<Secp256k1>, context: &[u8]) -> bool {
        let challenge = challenge(context, statement, &self.commitment);
        Point::generator().to_point() * &self.response == self.commitment + statement * &challenge
    }
}

fn challenge(context: &[u8], statement: &Point<Secp256k1>, commitment: &Point<Secp256k1>) -> Scalar<Secp256k1> {
    let mut hasher = Sha256::new();
    hasher.update(CHALLENGE_DOMAIN);
    hasher.update((context.len() as u32).to_be_bytes());
    hasher.update(context);
    hasher.update(statement.to_bytes(true));
    hasher.update(commitment.to_bytes(true));
    Scalar::from_be_bytes_mod_order(hasher.finalize())
}
