//! Message framing and reply construction.

use crate::{errors::ErrorCode, types::MessageType};
use rand::RngCore;

/// Number of header segments in every frame: `from`, `response_of`, `id`,
/// type byte, error byte.
const HEADER_SEGMENTS: usize = 5;

/// Number of random bytes behind a correlation id (hex-encoded to 12 chars).
const ID_BYTES: usize = 6;

/// A decoded wire message.
///
/// The type is kept as the raw byte so that a reply can echo a request whose
/// type this node does not recognize; [Message::kind] is the typed view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Identity of the sender.
    pub from: String,
    /// For replies, the `from` of the request being answered; empty otherwise.
    pub response_of: String,
    /// Correlation id, echoed unchanged in the reply.
    pub id: String,
    kind: u8,
    /// Status code; `Ok` in requests.
    pub error: ErrorCode,
    /// Opaque payload segments; arity is determined by type and direction.
    pub data: Vec<Vec<u8>>,
}

/// An inbound frame that could not be parsed into a [Message].
#[derive(Debug, thiserror::Error)]
pub enum ParseMessageError {
    /// Fewer segments than the fixed header requires.
    #[error("frame has {0} segments, expected at least {HEADER_SEGMENTS}")]
    TooShort(usize),
    /// The type or error segment was empty.
    #[error("header segment {0} is empty")]
    EmptySegment(&'static str),
}

impl Message {
    /// Build a request with a fresh correlation id.
    pub fn request(kind: MessageType, from: impl Into<String>, data: Vec<Vec<u8>>) -> Self {
        Message {
            from: from.into(),
            response_of: String::new(),
            id: random_id(),
            kind: kind as u8,
            error: ErrorCode::Ok,
            data,
        }
    }

    /// Build the skeleton reply to this message.
    ///
    /// The reply echoes the correlation id and the raw type byte, names the
    /// responder in `from`, points `response_of` at the requester, and starts
    /// out successful and empty; handlers append data or override the status.
    pub fn response(&self, responder: &str) -> Self {
        Message {
            from: responder.to_string(),
            response_of: self.from.clone(),
            id: self.id.clone(),
            kind: self.kind,
            error: ErrorCode::Ok,
            data: Vec::new(),
        }
    }

    /// Build a bare failure reply for an inbound frame that never became a
    /// request.
    ///
    /// With no parsed header to echo, the correlation fields stay empty and
    /// the type is `None`; the reply exists so the request/reply alternation
    /// of the transport is preserved even for garbage input.
    pub fn failure(responder: &str, error: ErrorCode) -> Self {
        Message {
            from: responder.to_string(),
            response_of: String::new(),
            id: String::new(),
            kind: MessageType::None as u8,
            error,
            data: Vec::new(),
        }
    }

    /// The typed message kind, if the type byte is in the taxonomy.
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::from_byte(self.kind)
    }

    /// The raw type byte as it appeared on the wire.
    pub fn raw_kind(&self) -> u8 {
        self.kind
    }

    /// Append a payload segment.
    pub fn push_data(&mut self, segment: Vec<u8>) {
        self.data.push(segment);
    }

    /// Decode a multipart frame.
    pub fn from_frames(frames: Vec<Vec<u8>>) -> Result<Self, ParseMessageError> {
        if frames.len() < HEADER_SEGMENTS {
            return Err(ParseMessageError::TooShort(frames.len()));
        }
        let mut frames = frames.into_iter();
        let from = next_string(&mut frames);
        let response_of = next_string(&mut frames);
        let id = next_string(&mut frames);
        let kind = next_byte(&mut frames).ok_or(ParseMessageError::EmptySegment("type"))?;
        let error = next_byte(&mut frames).ok_or(ParseMessageError::EmptySegment("error"))?;
        Ok(Message {
            from,
            response_of,
            id,
            kind,
            error: ErrorCode::from_byte(error),
            data: frames.collect(),
        })
    }

    /// Encode into the multipart frame representation.
    pub fn into_frames(self) -> Vec<Vec<u8>> {
        let mut frames = Vec::with_capacity(HEADER_SEGMENTS + self.data.len());
        frames.push(self.from.into_bytes());
        frames.push(self.response_of.into_bytes());
        frames.push(self.id.into_bytes());
        frames.push(vec![self.kind]);
        frames.push(vec![self.error as u8]);
        frames.extend(self.data);
        frames
    }

    /// Check that `reply` answers this request.
    ///
    /// Verifies the correlation id, the addressing, the echoed type, a
    /// successful status, and that at least `min_data_len` segments came back.
    /// This is the coordinator-side counterpart of [Message::response].
    pub fn expect_response(&self, reply: &Message, min_data_len: usize) -> Result<(), ResponseMismatch> {
        if reply.id != self.id {
            return Err(ResponseMismatch::Id { got: reply.id.clone(), expected: self.id.clone() });
        }
        if reply.response_of != self.from {
            return Err(ResponseMismatch::Addressing { got: reply.response_of.clone(), expected: self.from.clone() });
        }
        if reply.kind != self.kind {
            return Err(ResponseMismatch::Kind { got: reply.kind, expected: self.kind });
        }
        if !reply.error.is_ok() {
            return Err(ResponseMismatch::Status(reply.error));
        }
        if reply.data.len() < min_data_len {
            return Err(ResponseMismatch::DataLen { got: reply.data.len(), expected: min_data_len });
        }
        Ok(())
    }
}

/// A reply that does not match the request it should answer.
#[derive(Debug, thiserror::Error)]
pub enum ResponseMismatch {
    /// Correlation id differs.
    #[error("id mismatch: got {got}, expected {expected}")]
    Id {
        /// Id carried by the reply.
        got: String,
        /// Id of the request.
        expected: String,
    },
    /// The reply is addressed to someone else.
    #[error("addressing mismatch: got {got}, expected {expected}")]
    Addressing {
        /// `response_of` carried by the reply.
        got: String,
        /// `from` of the request.
        expected: String,
    },
    /// The echoed type byte differs.
    #[error("type mismatch: got {got}, expected {expected}")]
    Kind {
        /// Type byte carried by the reply.
        got: u8,
        /// Type byte of the request.
        expected: u8,
    },
    /// The reply carries an error status.
    #[error("response has error: {0}")]
    Status(ErrorCode),
    /// Fewer data segments than the caller requires.
    #[error("data length mismatch: got {got}, expected at least {expected}")]
    DataLen {
        /// Segments carried by the reply.
        got: usize,
        /// Minimum the caller expected.
        expected: usize,
    },
}

fn random_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn next_string(frames: &mut impl Iterator<Item = Vec<u8>>) -> String {
    frames.next().map(|bytes| String::from_utf8_lossy(&bytes).into_owned()).unwrap_or_default()
}

fn next_byte(frames: &mut impl Iterator<Item = Vec<u8>>) -> Option<u8> {
    frames.next().and_then(|segment| segment.first().copied())
}
