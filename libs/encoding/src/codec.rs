//! Payload encoding.

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};

/// Format discriminant prefixed to every encoded payload.
///
/// A single format exists today; the byte is there so the at-rest blobs and
/// wire payloads stay decodable if the encoding ever has to change.
#[repr(u8)]
enum Format {
    Bincode = 1,
}

/// Payloads are bounded; key metas with per-party verification keys are the
/// largest values and stay far below this.
const MAX_PAYLOAD_SIZE: u64 = 16 * 1024 * 1024;

fn options() -> impl bincode::Options {
    bincode::options().with_limit(MAX_PAYLOAD_SIZE).with_varint_encoding().with_little_endian()
}

/// Encode a payload value.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = vec![Format::Bincode as u8];
    options().serialize_into(&mut bytes, value)?;
    Ok(bytes)
}

/// Decode a payload value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    let (format, rest) = bytes.split_first().ok_or(DecodeError::Empty)?;
    if *format != Format::Bincode as u8 {
        return Err(DecodeError::UnknownFormat(*format));
    }
    Ok(options().deserialize(rest)?)
}

/// A payload could not be encoded.
#[derive(Debug, thiserror::Error)]
#[error("encoding: {0}")]
pub struct EncodeError(#[from] Box<bincode::ErrorKind>);

/// A payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The buffer had no format byte.
    #[error("decoding: empty payload")]
    Empty,
    /// The format byte names no known format.
    #[error("decoding: unknown format tag {0}")]
    UnknownFormat(u8),
    /// The payload body was truncated or malformed.
    #[error("decoding: {0}")]
    Malformed(#[from] Box<bincode::ErrorKind>),
}
