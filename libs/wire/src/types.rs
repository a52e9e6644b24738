//! The message-type taxonomy.

use std::fmt;

/// The kind of a wire message.
///
/// The numeric codes are part of the protocol and must not be reordered.
/// Types `1..=3` belong to the RSA family, `4..=10` to the ECDSA family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Placeholder type; never carries a valid request.
    None = 0,
    /// Install an RSA key share and its public meta.
    SendRsaKeyShare = 1,
    /// Produce an RSA signature share over a document hash.
    GetRsaSigShare = 2,
    /// Remove an RSA key share.
    DeleteRsaKeyShare = 3,
    /// Install an ECDSA key share and its public meta.
    SendEcdsaKeyShare = 4,
    /// Complete the ECDSA group init exchange for a key.
    EcdsaInitKeys = 5,
    /// Open a signing session and produce the first round message.
    EcdsaRound1 = 6,
    /// Advance a signing session with the collected round-1 messages.
    EcdsaRound2 = 7,
    /// Advance a signing session with the collected round-2 messages.
    EcdsaRound3 = 8,
    /// Finish a signing session and produce the signature pair.
    EcdsaGetSignature = 9,
    /// Remove an ECDSA key share.
    DeleteEcdsaKeyShare = 10,
}

impl MessageType {
    /// Decode a type byte, if it names a known type.
    pub fn from_byte(byte: u8) -> Option<Self> {
        use MessageType::*;
        let kind = match byte {
            0 => None,
            1 => SendRsaKeyShare,
            2 => GetRsaSigShare,
            3 => DeleteRsaKeyShare,
            4 => SendEcdsaKeyShare,
            5 => EcdsaInitKeys,
            6 => EcdsaRound1,
            7 => EcdsaRound2,
            8 => EcdsaRound3,
            9 => EcdsaGetSignature,
            10 => DeleteEcdsaKeyShare,
            _ => return Option::None,
        };
        Some(kind)
    }

    /// True if this type is handled by the RSA family.
    pub fn is_rsa(self) -> bool {
        matches!(self, Self::SendRsaKeyShare | Self::GetRsaSigShare | Self::DeleteRsaKeyShare)
    }

    /// True if this type is handled by the ECDSA family.
    pub fn is_ecdsa(self) -> bool {
        use MessageType::*;
        matches!(
            self,
            SendEcdsaKeyShare | EcdsaInitKeys | EcdsaRound1 | EcdsaRound2 | EcdsaRound3 | EcdsaGetSignature
                | DeleteEcdsaKeyShare
        )
    }

    /// Number of data segments a well-formed request of this type carries.
    pub fn client_data_len(self) -> usize {
        use MessageType::*;
        match self {
            None => 0,
            SendRsaKeyShare => 3,      // key id, key share, key meta
            GetRsaSigShare => 2,       // key id, document hash
            DeleteRsaKeyShare => 1,    // key id
            SendEcdsaKeyShare => 3,    // key id, key share, key meta
            EcdsaInitKeys => 2,        // key id, key init message list
            EcdsaRound1 => 2,          // key id, document hash
            EcdsaRound2 => 1,          // round-1 message list
            EcdsaRound3 => 1,          // round-2 message list
            EcdsaGetSignature => 1,    // round-3 message list
            DeleteEcdsaKeyShare => 1,  // key id
        }
    }

    /// Number of data segments a successful reply of this type carries.
    pub fn node_data_len(self) -> usize {
        use MessageType::*;
        match self {
            None => 0,
            SendRsaKeyShare => 0,
            GetRsaSigShare => 1,      // signature share
            DeleteRsaKeyShare => 0,
            SendEcdsaKeyShare => 1,   // key init message
            EcdsaInitKeys => 0,
            EcdsaRound1 => 1,         // round-1 message
            EcdsaRound2 => 1,         // round-2 message
            EcdsaRound3 => 1,         // round-3 message
            EcdsaGetSignature => 1,   // signature pair
            DeleteEcdsaKeyShare => 0,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "undefined",
            Self::SendRsaKeyShare => "RSA send key share",
            Self::GetRsaSigShare => "RSA get signature share",
            Self::DeleteRsaKeyShare => "RSA delete key share",
            Self::SendEcdsaKeyShare => "ECDSA send key share",
            Self::EcdsaInitKeys => "ECDSA init keys",
            Self::EcdsaRound1 => "ECDSA round 1",
            Self::EcdsaRound2 => "ECDSA round 2",
            Self::EcdsaRound3 => "ECDSA round 3",
            Self::EcdsaGetSignature => "ECDSA get signature",
            Self::DeleteEcdsaKeyShare => "ECDSA delete key share",
        };
        f.write_str(name)
    }
}
