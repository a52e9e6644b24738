//! The per-signature signing session.
//!
//! One session signs one digest. The holder walks through three rounds and
//! a combine step, consuming the stage value at each transition so a
//! session can never be replayed or driven out of order:
//!
//! ```text
//! begin_signing -> SessionRound1 --round2--> SessionRound2
//!               --round3--> SessionRound3 --finish--> EcdsaSignature
//! ```
//!
//! Round 1 deals fresh nonce and mask polynomials (Feldman-committed, with
//! per-member sealed shares). Round 2 opens and verifies the dealings
//! addressed to this member and publishes the product share `δ_i = k_i·γ_i`
//! and the mask commitment `Γ_i = γ_i·G`. Round 3 interpolates `δ = kγ` and
//! `Γ = γ·G`, derives `R = δ⁻¹·Γ` (so `R = k⁻¹·G`) and publishes the
//! partial signature `σ_i = k_i·(h + r·x_i)`. The combine step interpolates
//! `s = k·(h + r·x)`, which verifies because the joint nonce is `k⁻¹`.

use crate::{
    keys::{EcdsaKeyMeta, EcdsaKeyShare, KeyError, MemberPublic},
    polynomial::{
        committed_evaluation, interpolate_points_at_zero, interpolate_scalars_at_zero, InterpolationError,
        Polynomial,
    },
    sealed::{self, SealedShare},
    signature::EcdsaSignature,
    util::{ordered_by_index, RosterError},
};
use generic_ec::{coords::AlwaysHasAffineX, curves::Secp256k1, NonZero, Point, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the digest being signed.
pub const DIGEST_LEN: usize = 32;

/// A signing round could not be carried out.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The share has not absorbed the group init exchange yet.
    #[error("key share is not initialized for signing")]
    NotInitialized,
    /// The digest is not a SHA-256 digest.
    #[error("digest is {0} octets, expected {DIGEST_LEN}")]
    InvalidDigest(usize),
    /// The share and meta disagree on the group shape.
    #[error(transparent)]
    Key(#[from] KeyError),
    /// A round message list does not cover the group.
    #[error(transparent)]
    Roster(#[from] RosterError),
    /// A round-1 message carries malformed polynomial commitments.
    #[error("member {0} sent malformed commitments")]
    MalformedCommitments(u16),
    /// A round-1 message has no dealing for this member.
    #[error("member {0} dealt us no share")]
    MissingDealing(u16),
    /// A dealing failed to open or did not match its commitments.
    #[error("dealing from member {0} does not verify")]
    InvalidDealing(u16),
    /// Interpolation of the collected values failed.
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    /// The joint nonce degenerated to zero; the signing attempt is void.
    #[error("degenerate nonce, the signing attempt must be restarted")]
    DegenerateNonce,
    /// The combined signature does not verify under the group key.
    #[error("combined signature does not verify")]
    InvalidSignature,
}

/// First broadcast of a signing session: Feldman-committed dealings of the
/// nonce and mask polynomials, with one sealed share per member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round1Message {
    /// 1-based index of the dealing member.
    pub sender: u16,
    nonce_commitments: Vec<Point<Secp256k1>>,
    mask_commitments: Vec<Point<Secp256k1>>,
    dealings: Vec<SealedShare>,
}

/// Second broadcast: the product share and the mask commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round2Message {
    /// 1-based index of the sending member.
    pub sender: u16,
    delta_share: Scalar<Secp256k1>,
    mask_commitment: Point<Secp256k1>,
}

/// Third broadcast: the partial signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round3Message {
    /// 1-based index of the sending member.
    pub sender: u16,
    partial_signature: Scalar<Secp256k1>,
}

/// A session that has dealt its round-1 message and waits for everyone
/// else's.
pub struct SessionRound1 {
    index: u16,
    parties: u16,
    threshold: u16,
    secret_share: Scalar<Secp256k1>,
    transport_secret: Scalar<Secp256k1>,
    members: Vec<MemberPublic>,
    public_key: Point<Secp256k1>,
    digest: [u8; DIGEST_LEN],
}

/// A session that has published its round-2 message.
#[derive(Debug)]
pub struct SessionRound2 {
    index: u16,
    parties: u16,
    secret_share: Scalar<Secp256k1>,
    nonce_share: Scalar<Secp256k1>,
    public_key: Point<Secp256k1>,
    digest: [u8; DIGEST_LEN],
}

/// A session that has published its partial signature and can combine.
pub struct SessionRound3 {
    parties: u16,
    r: NonZero<Scalar<Secp256k1>>,
    public_key: Point<Secp256k1>,
    digest_scalar: Scalar<Secp256k1>,
}

impl EcdsaKeyShare {
    /// Open a signing session over a SHA-256 digest.
    ///
    /// Produces the session's round-1 broadcast alongside the next stage.
    pub fn begin_signing(
        &self,
        meta: &EcdsaKeyMeta,
        digest: &[u8],
    ) -> Result<(SessionRound1, Round1Message), SigningError> {
        meta.validate().map_err(KeyError::from)?;
        let group = self.group().ok_or(SigningError::NotInitialized)?;
        let digest: [u8; DIGEST_LEN] =
            digest.try_into().map_err(|_| SigningError::InvalidDigest(digest.len()))?;
        if group.members.len() != usize::from(meta.parties) {
            return Err(SigningError::Roster(RosterError::WrongCount {
                got: group.members.len(),
                expected: usize::from(meta.parties),
            }));
        }

        let nonce_poly = Polynomial::random(meta.threshold, None);
        let mask_poly = Polynomial::random(meta.threshold, None);

        let dealings = group
            .members
            .iter()
            .map(|member| {
                sealed::seal_shares(
                    &nonce_poly.evaluate(member.index),
                    &mask_poly.evaluate(member.index),
                    &self.transport_secret,
                    &member.transport_key,
                    self.index,
                    member.index,
                    &digest,
                )
            })
            .collect();

        let message = Round1Message {
            sender: self.index,
            nonce_commitments: nonce_poly.commitments(),
            mask_commitments: mask_poly.commitments(),
            dealings,
        };
        let session = SessionRound1 {
            index: self.index,
            parties: meta.parties,
            threshold: meta.threshold,
            secret_share: self.secret_share,
            transport_secret: self.transport_secret,
            members: group.members.clone(),
            public_key: group.public_key,
            digest,
        };
        Ok((session, message))
    }
}

impl SessionRound1 {
    /// Open the dealings addressed to this member, verify them against
    /// their commitments, and publish the product share.
    pub fn round2(self, messages: &[Round1Message]) -> Result<(SessionRound2, Round2Message), SigningError> {
        let ordered = ordered_by_index(messages, self.parties, |message| message.sender)?;

        let commitment_len = usize::from(self.threshold) + 1;
        let mut nonce_share = Scalar::<Secp256k1>::zero();
        let mut mask_share = Scalar::<Secp256k1>::zero();
        for message in ordered {
            if message.nonce_commitments.len() != commitment_len
                || message.mask_commitments.len() != commitment_len
            {
                return Err(SigningError::MalformedCommitments(message.sender));
            }
            let dealing = message
                .dealings
                .iter()
                .find(|dealing| dealing.recipient == self.index)
                .ok_or(SigningError::MissingDealing(message.sender))?;
            let sender_key = &self
                .members
                .iter()
                .find(|member| member.index == message.sender)
                .ok_or(SigningError::MissingDealing(message.sender))?
                .transport_key;
            let (nonce_part, mask_part) =
                sealed::open_shares(dealing, &self.transport_secret, sender_key, message.sender, &self.digest)
                    .map_err(|_| SigningError::InvalidDealing(message.sender))?;

            // Feldman check: the dealt evaluations must match the broadcast
            // commitments.
            let nonce_expected = committed_evaluation(&message.nonce_commitments, self.index);
            let mask_expected = committed_evaluation(&message.mask_commitments, self.index);
            if Point::generator().to_point() * &nonce_part != nonce_expected
                || Point::generator().to_point() * &mask_part != mask_expected
            {
                return Err(SigningError::InvalidDealing(message.sender));
            }

            nonce_share = nonce_share + nonce_part;
            mask_share = mask_share + mask_part;
        }

        let message = Round2Message {
            sender: self.index,
            delta_share: nonce_share * &mask_share,
            mask_commitment: Point::generator().to_point() * &mask_share,
        };
        let session = SessionRound2 {
            index: self.index,
            parties: self.parties,
            secret_share: self.secret_share,
            nonce_share,
            public_key: self.public_key,
            digest: self.digest,
        };
        Ok((session, message))
    }
}

impl SessionRound2 {
    /// Derive the signature's `r` from the collected product shares and
    /// publish the partial signature.
    pub fn round3(self, messages: &[Round2Message]) -> Result<(SessionRound3, Round3Message), SigningError> {
        let ordered = ordered_by_index(messages, self.parties, |message| message.sender)?;

        let delta_points: Vec<_> = ordered.iter().map(|message| (message.sender, message.delta_share)).collect();
        let mask_points: Vec<_> = ordered.iter().map(|message| (message.sender, message.mask_commitment)).collect();
        let delta = interpolate_scalars_at_zero(&delta_points)?;
        let mask_point = interpolate_points_at_zero(&mask_points)?;

        let delta_inv = delta.invert().ok_or(SigningError::DegenerateNonce)?;
        let r_point = NonZero::from_point(mask_point * &delta_inv).ok_or(SigningError::DegenerateNonce)?;
        let r = NonZero::from_scalar(r_point.x().to_scalar()).ok_or(SigningError::DegenerateNonce)?;

        let digest_scalar = Scalar::from_be_bytes_mod_order(self.digest);
        let partial_signature =
            self.nonce_share * (digest_scalar + r.into_inner() * self.secret_share);

        let message = Round3Message { sender: self.index, partial_signature };
        let session = SessionRound3 { parties: self.parties, r, public_key: self.public_key, digest_scalar };
        Ok((session, message))
    }
}

impl SessionRound3 {
    /// Combine the partial signatures and verify the result under the
    /// group public key.
    pub fn finish(self, messages: &[Round3Message]) -> Result<EcdsaSignature, SigningError> {
        let ordered = ordered_by_index(messages, self.parties, |message| message.sender)?;
        let points: Vec<_> = ordered.iter().map(|message| (message.sender, message.partial_signature)).collect();
        let s = interpolate_scalars_at_zero(&points)?;
        let s = NonZero::from_scalar(s).ok_or(SigningError::DegenerateNonce)?;
        let signature = EcdsaSignature { r: self.r, s }.normalize_s();
        if !signature.verify(&self.public_key, &self.digest_scalar) {
            return Err(SigningError::InvalidSignature);
        }
        Ok(signature)
    }
}
