//! Key shares, group meta and the init exchange.

use crate::{
    polynomial::{interpolate_points_at_zero, InterpolationError},
    util::{ordered_by_index, RosterError},
    zk::SchnorrProof,
};
use generic_ec::{curves::Secp256k1, Point, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Public parameters of a threshold ECDSA key group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaKeyMeta {
    /// Number of dealt shares.
    pub parties: u16,
    /// Degree of the sharing polynomial; `threshold + 1` shares determine
    /// the key.
    pub threshold: u16,
}

/// The meta does not describe a usable group.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetaError {
    /// The signing rounds interpolate degree-2t products, which needs
    /// `parties >= 2 * threshold + 1`.
    #[error("{parties} parties cannot support threshold {threshold}")]
    UnsupportedThreshold {
        /// Group size.
        parties: u16,
        /// Sharing degree.
        threshold: u16,
    },
}

impl EcdsaKeyMeta {
    /// Build a validated meta.
    pub fn new(parties: u16, threshold: u16) -> Result<Self, MetaError> {
        let meta = Self { parties, threshold };
        meta.validate()?;
        Ok(meta)
    }

    /// Check the honest-majority bound. Metas arriving over the wire are
    /// revalidated before use.
    pub fn validate(&self) -> Result<(), MetaError> {
        if self.threshold == 0 || u32::from(self.parties) < 2 * u32::from(self.threshold) + 1 {
            return Err(MetaError::UnsupportedThreshold { parties: self.parties, threshold: self.threshold });
        }
        Ok(())
    }
}

/// One member's public contribution to the init exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInitMessage {
    /// 1-based index of the member.
    pub index: u16,
    /// Commitment to the member's key share, `x_i * G`.
    pub share_commitment: Point<Secp256k1>,
    /// The member's pairwise transport key, `e_i * G`.
    pub transport_key: Point<Secp256k1>,
    /// Proof of knowledge of the key share behind the commitment.
    pub proof: SchnorrProof,
}

/// Per-member public elements installed by the init exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPublic {
    /// 1-based index of the member.
    pub index: u16,
    /// Commitment to the member's key share.
    pub share_commitment: Point<Secp256k1>,
    /// The member's pairwise transport key.
    pub transport_key: Point<Secp256k1>,
}

/// Group-level public elements: the joint public key plus every member's
/// commitments, ordered by index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPublic {
    /// The group's ECDSA public key.
    pub public_key: Point<Secp256k1>,
    /// All members, ordered by index.
    pub members: Vec<MemberPublic>,
}

/// One holder's share of a threshold ECDSA key.
///
/// A freshly dealt share is *uninitialized*: it can produce its
/// [KeyInitMessage] but cannot sign. Once [set_key][EcdsaKeyShare::set_key]
/// has absorbed the whole group's init messages the share carries the group
/// public elements and is ready for signing sessions.
#[derive(Clone, Serialize, Deserialize)]
pub struct EcdsaKeyShare {
    /// 1-based share index.
    pub index: u16,
    pub(crate) secret_share: Scalar<Secp256k1>,
    pub(crate) transport_secret: Scalar<Secp256k1>,
    pub(crate) group: Option<GroupPublic>,
}

/// The init exchange failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// The share index does not fit the group described by the meta.
    #[error("share index {0} outside the group")]
    IndexOutOfRange(u16),
    /// See [MetaError].
    #[error(transparent)]
    Meta(#[from] MetaError),
    /// The collected init messages do not cover the group.
    #[error(transparent)]
    Roster(#[from] RosterError),
    /// A member's proof of knowledge does not verify.
    #[error("init message from member {0} carries a bad proof")]
    BadProof(u16),
    /// The message claiming our index does not match our own share.
    #[error("init message for our index was not produced by this share")]
    ForeignSelfMessage,
    /// The share commitments do not interpolate to a public key.
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
}

impl EcdsaKeyShare {
    /// Build a share from raw parts. Mostly useful to dealers.
    pub fn new(index: u16, secret_share: Scalar<Secp256k1>, transport_secret: Scalar<Secp256k1>) -> Self {
        Self { index, secret_share, transport_secret, group: None }
    }

    /// True once the init exchange has installed the group elements.
    pub fn is_initialized(&self) -> bool {
        self.group.is_some()
    }

    /// The installed group elements, if initialized.
    pub fn group(&self) -> Option<&GroupPublic> {
        self.group.as_ref()
    }

    /// The group public key, if initialized.
    pub fn public_key(&self) -> Option<&Point<Secp256k1>> {
        self.group.as_ref().map(|group| &group.public_key)
    }

    /// Drop the installed group elements, returning the share to its
    /// uninitialized state.
    pub fn clear_group(&mut self) {
        self.group = None;
    }

    /// Produce this share's contribution to the init exchange.
    pub fn init(&self, meta: &EcdsaKeyMeta) -> Result<KeyInitMessage, KeyError> {
        meta.validate()?;
        if self.index == 0 || self.index > meta.parties {
            return Err(KeyError::IndexOutOfRange(self.index));
        }
        let share_commitment = Point::generator().to_point() * &self.secret_share;
        let transport_key = Point::generator().to_point() * &self.transport_secret;
        let context = init_context(self.index, &transport_key);
        let proof = SchnorrProof::prove(&self.secret_share, &share_commitment, &context);
        Ok(KeyInitMessage { index: self.index, share_commitment, transport_key, proof })
    }

    /// Absorb the whole group's init messages: verify them, interpolate the
    /// group public key, and install the member elements.
    pub fn set_key(&mut self, meta: &EcdsaKeyMeta, messages: &[KeyInitMessage]) -> Result<(), KeyError> {
        meta.validate()?;
        if self.index == 0 || self.index > meta.parties {
            return Err(KeyError::IndexOutOfRange(self.index));
        }
        let ordered = ordered_by_index(messages, meta.parties, |message| message.index)?;

        for message in &ordered {
            let context = init_context(message.index, &message.transport_key);
            if !message.proof.verify(&message.share_commitment, &context) {
                return Err(KeyError::BadProof(message.index));
            }
        }

        // The message under our own index must be ours.
        let own_commitment = Point::generator().to_point() * &self.secret_share;
        let own_transport = Point::generator().to_point() * &self.transport_secret;
        let own_message = ordered[usize::from(self.index) - 1];
        if own_message.share_commitment != own_commitment || own_message.transport_key != own_transport {
            return Err(KeyError::ForeignSelfMessage);
        }

        let commitments: Vec<_> =
            ordered.iter().map(|message| (message.index, message.share_commitment)).collect();
        let public_key = interpolate_points_at_zero(&commitments)?;

        let members = ordered
            .into_iter()
            .map(|message| MemberPublic {
                index: message.index,
                share_commitment: message.share_commitment,
                transport_key: message.transport_key,
            })
            .collect();
        self.group = Some(GroupPublic { public_key, members });
        Ok(())
    }
}

// The secret scalars stay out of Debug output.
impl std::fmt::Debug for EcdsaKeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaKeyShare")
            .field("index", &self.index)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

fn init_context(index: u16, transport_key: &Point<Secp256k1>) -> Vec<u8> {
    let mut context = Vec::new();
    context.extend_from_slice(b"tchsm/key-init/v1");
    context.extend_from_slice(&index.to_be_bytes());
    context.extend_from_slice(transport_key.to_bytes(true).as_ref());
    context
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dealer::deal_shares;

    fn init_all(shares: &[EcdsaKeyShare], meta: &EcdsaKeyMeta) -> Vec<KeyInitMessage> {
        shares.iter().map(|share| share.init(meta).unwrap()).collect()
    }

    #[test]
    fn meta_bounds() {
        assert!(EcdsaKeyMeta::new(3, 1).is_ok());
        assert!(EcdsaKeyMeta::new(5, 2).is_ok());
        assert!(matches!(EcdsaKeyMeta::new(3, 0), Err(MetaError::UnsupportedThreshold { .. })));
        assert!(matches!(EcdsaKeyMeta::new(4, 2), Err(MetaError::UnsupportedThreshold { .. })));
    }

    #[test]
    fn init_exchange_installs_the_dealt_public_key() {
        let meta = EcdsaKeyMeta::new(3, 1).unwrap();
        let (mut shares, public_key) = deal_shares(&meta);
        let messages = init_all(&shares, &meta);
        for share in &mut shares {
            assert!(!share.is_initialized());
            share.set_key(&meta, &messages).unwrap();
            assert!(share.is_initialized());
            assert_eq!(share.public_key(), Some(&public_key));
        }
    }

    #[test]
    fn tampered_proof_is_rejected() {
        let meta = EcdsaKeyMeta::new(3, 1).unwrap();
        let (mut shares, _) = deal_shares(&meta);
        let mut messages = init_all(&shares, &meta);
        messages[1].share_commitment = Point::generator().to_point() * &Scalar::from_be_bytes_mod_order([5u8; 32]);
        assert_eq!(shares[0].set_key(&meta, &messages), Err(KeyError::BadProof(2)));
    }

    #[test]
    fn incomplete_roster_is_rejected() {
        let meta = EcdsaKeyMeta::new(3, 1).unwrap();
        let (mut shares, _) = deal_shares(&meta);
        let messages = init_all(&shares, &meta);
        let result = shares[0].set_key(&meta, &messages[..2]);
        assert_eq!(result, Err(KeyError::Roster(RosterError::WrongCount { got: 2, expected: 3 })));
    }

    #[test]
    fn swapped_self_message_is_rejected() {
        let meta = EcdsaKeyMeta::new(3, 1).unwrap();
        let (mut shares, _) = deal_shares(&meta);
        let other = deal_shares(&meta).0;
        let mut messages = init_all(&shares, &meta);
        messages[0] = other[0].init(&meta).unwrap();
        assert_eq!(shares[0].set_key(&meta, &messages), Err(KeyError::ForeignSelfMessage));
    }

    #[test]
    fn clear_group_resets_initialization() {
        let meta = EcdsaKeyMeta::new(3, 1).unwrap();
        let (mut shares, _) = deal_shares(&meta);
        let messages = init_all(&shares, &meta);
        shares[0].set_key(&meta, &messages).unwrap();
        shares[0].clear_group();
        assert!(!shares[0].is_initialized());
    }
}
