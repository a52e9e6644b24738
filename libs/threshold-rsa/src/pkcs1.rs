//! EMSA-PKCS1-v1_5 encoding of a SHA-256 digest.

use thiserror::Error;

/// DER DigestInfo prefix for SHA-256.
const SHA256_DIGEST_INFO: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05, 0x00, 0x04, 0x20,
];

/// SHA-256 digest length in octets.
pub const DIGEST_LEN: usize = 32;

/// An input that cannot be padded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaddingError {
    /// The digest is not a SHA-256 digest.
    #[error("digest is {0} octets, expected {DIGEST_LEN}")]
    DigestLength(usize),
    /// The modulus is too short to carry the padded digest.
    #[error("modulus too short for padded digest: {0} octets")]
    ModulusTooShort(usize),
}

/// Encode a SHA-256 digest into an `em_len`-octet message representative.
///
/// Layout: `0x00 0x01 FF..FF 0x00 DigestInfo digest`.
pub fn emsa_encode(digest: &[u8], em_len: usize) -> Result<Vec<u8>, PaddingError> {
    if digest.len() != DIGEST_LEN {
        return Err(PaddingError::DigestLength(digest.len()));
    }
    let t_len = SHA256_DIGEST_INFO.len() + DIGEST_LEN;
    if em_len < t_len + 11 {
        return Err(PaddingError::ModulusTooShort(em_len));
    }
    let mut em = Vec::with_capacity(em_len);
    em.push(0x00);
    em.push(0x01);
    em.resize(em_len - t_len - 1, 0xff);
    em.push(0x00);
    em.extend_from_slice(&SHA256_DIGEST_INFO);
    em.extend_from_slice(digest);
    Ok(em)
}
