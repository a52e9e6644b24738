//! Pairwise sealed transfer of dealt shares.
//!
//! Round-1 messages are broadcast, but the share each member deals to each
//! other member is private. Every pair of members shares a static
//! Diffie-Hellman secret derived from the transport keys exchanged during
//! init; dealt shares ride inside the broadcast sealed to their recipient
//! with ChaCha20-Poly1305, bound to the sender, recipient and session
//! digest.

use chacha20poly1305::{
    aead::{Aead, Payload},
    ChaCha20Poly1305, Key, KeyInit, Nonce,
};
use generic_ec::{curves::Secp256k1, Point, Scalar};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const KEY_DOMAIN: &[u8] = b"tchsm/dealing-key/v1";
const NONCE_LEN: usize = 12;
const SCALAR_LEN: usize = 32;

/// A dealt share sealed to one recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedShare {
    /// 1-based index of the member that can open this.
    pub recipient: u16,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

/// A sealed share that cannot be opened.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SealedShareError {
    /// Authentication failed: wrong pair, wrong session, or tampering.
    #[error("sealed share does not authenticate")]
    BadSeal,
    /// The plaintext does not hold the expected share material.
    #[error("sealed share has malformed contents")]
    MalformedContents,
}

/// Seal a pair of dealt share scalars to one recipient.
pub(crate) fn seal_shares(
    nonce_share: &Scalar<Secp256k1>,
    mask_share: &Scalar<Secp256k1>,
    own_secret: &Scalar<Secp256k1>,
    peer_key: &Point<Secp256k1>,
    sender: u16,
    recipient: u16,
    session: &[u8; 32],
) -> SealedShare {
    let mut plaintext = nonce_share.to_be_bytes().to_vec();
    plaintext.extend_from_slice(&mask_share.to_be_bytes().to_vec());
    seal(own_secret, peer_key, sender, recipient, session, &plaintext)
}

/// Open a sealed dealing and parse the two dealt share scalars.
pub(crate) fn open_shares(
    sealed: &SealedShare,
    own_secret: &Scalar<Secp256k1>,
    peer_key: &Point<Secp256k1>,
    sender: u16,
    session: &[u8; 32],
) -> Result<(Scalar<Secp256k1>, Scalar<Secp256k1>), SealedShareError> {
    let plaintext = open(sealed, own_secret, peer_key, sender, session)?;
    if plaintext.len() != 2 * SCALAR_LEN {
        return Err(SealedShareError::MalformedContents);
    }
    let (nonce_share, mask_share) = plaintext.split_at(SCALAR_LEN);
    let nonce_share = Scalar::from_be_bytes(nonce_share).map_err(|_| SealedShareError::MalformedContents)?;
    let mask_share = Scalar::from_be_bytes(mask_share).map_err(|_| SealedShareError::MalformedContents)?;
    Ok((nonce_share, mask_share))
}

fn seal(
    own_secret: &Scalar<Secp256k1>,
    peer_key: &Point<Secp256k1>,
    sender: u16,
    recipient: u16,
    session: &[u8; 32],
    plaintext: &[u8],
) -> SealedShare {
    let key = pair_key(own_secret, peer_key, sender, recipient);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let payload = Payload { msg: plaintext, aad: &aad(sender, recipient, session) };
    // Encryption is infallible for in-memory buffers of this size.
    let ciphertext = cipher.encrypt(Nonce::from_slice(&nonce), payload).unwrap_or_default();
    SealedShare { recipient, nonce, ciphertext }
}

fn open(
    sealed: &SealedShare,
    own_secret: &Scalar<Secp256k1>,
    peer_key: &Point<Secp256k1>,
    sender: u16,
    session: &[u8; 32],
) -> Result<Vec<u8>, SealedShareError> {
    let key = pair_key(own_secret, peer_key, sender, sealed.recipient);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let payload = Payload { msg: &sealed.ciphertext, aad: &aad(sender, sealed.recipient, session) };
    cipher.decrypt(Nonce::from_slice(&sealed.nonce), payload).map_err(|_| SealedShareError::BadSeal)
}

// The Diffie-Hellman point is symmetric in the pair, so both sides derive
// the same key; the sorted index pair separates key material per pair.
fn pair_key(own_secret: &Scalar<Secp256k1>, peer_key: &Point<Secp256k1>, a: u16, b: u16) -> [u8; 32] {
    let shared = peer_key * own_secret;
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut hasher = Sha256::new();
    hasher.update(KEY_DOMAIN);
    hasher.update(shared.to_bytes(true));
    hasher.update(low.to_be_bytes());
    hasher.update(high.to_be_bytes());
    hasher.finalize().into()
}

fn aad(sender: u16, recipient: u16, session: &[u8; 32]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(4 + session.len());
    aad.extend_from_slice(&sender.to_be_bytes());
    aad.extend_from_slice(&recipient.to_be_bytes());
    aad.extend_from_slice(session);
    aad
}
