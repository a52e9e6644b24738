//! The one-byte status taxonomy carried in replies.

/// Status code of a reply.
///
/// The numeric codes are part of the protocol. `Unknown` doubles as the
/// decoding of any byte outside the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[repr(u8)]
pub enum ErrorCode {
    /// Not an error.
    #[error("ok")]
    Ok = 0,
    /// Malformed request: wrong arity or unrecognized type.
    #[error("invalid message")]
    InvalidMessage = 1,
    /// The inbound frame could not be received.
    #[error("cannot receive message")]
    ReceiveMessage = 2,
    /// The inbound frame could not be parsed into a message.
    #[error("cannot parse received message")]
    ParseMessage = 3,
    /// The reply could not be sent.
    #[error("cannot send response")]
    SendResponse = 4,
    /// A payload segment could not be decoded.
    #[error("cannot decode payload")]
    Decoding = 5,
    /// A reply payload could not be encoded.
    #[error("cannot encode payload")]
    Encoding = 6,
    /// The referenced key id is not held by this node.
    #[error("key not found")]
    KeyNotFound = 7,
    /// The signature share could not be produced or did not verify.
    #[error("cannot sign the document")]
    DocSign = 8,
    /// Internal failure, typically persistence or a protocol-round error.
    #[error("internal error")]
    Internal = 9,
    /// The key or session is not initialized for the requested operation.
    #[error("not initialized")]
    NotInitialized = 10,
    /// Catch-all for status bytes outside the table.
    #[error("unknown error")]
    Unknown = 255,
}

impl ErrorCode {
    /// Decode a status byte. Bytes outside the table map to `Unknown`.
    pub fn from_byte(byte: u8) -> Self {
        use ErrorCode::*;
        match byte {
            0 => Ok,
            1 => InvalidMessage,
            2 => ReceiveMessage,
            3 => ParseMessage,
            4 => SendResponse,
            5 => Decoding,
            6 => Encoding,
            7 => KeyNotFound,
            8 => DocSign,
            9 => Internal,
            10 => NotInitialized,
            _ => Unknown,
        }
    }

    /// True if this code signals success.
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}
