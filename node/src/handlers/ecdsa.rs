//! ECDSA request handlers and the signing-session state.

use crate::keystore::KeyStore;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use threshold_ecdsa::{
    EcdsaKeyMeta, EcdsaKeyShare, KeyInitMessage, Round1Message, Round2Message, Round3Message, SessionRound1,
    SessionRound2, SessionRound3, SigningError,
};
use tracing::{debug, info, warn};
use wire::{ErrorCode, Message, MessageType};

/// Which round the live session is waiting for.
///
/// Holding the typestate inside an enum makes out-of-order rounds
/// unrepresentable: a stage can only be consumed by the one message kind
/// that advances it.
pub enum SigningStage {
    /// Round 1 was produced; waiting for the collected round-1 messages.
    AwaitingRound2(SessionRound1),
    /// Round 2 was produced; waiting for the collected round-2 messages.
    AwaitingRound3(SessionRound2),
    /// Round 3 was produced; waiting for the collected round-3 messages.
    AwaitingSignature(SessionRound3),
}

/// The node's single in-flight signing session, bound to one key.
pub struct ActiveSession {
    /// Id of the key the session signs with.
    pub key_id: String,
    stage: SigningStage,
}

/// Handle an ECDSA-family request. Always returns a framed reply.
pub fn handle(
    store: &KeyStore,
    session: &mut Option<ActiveSession>,
    node_id: &str,
    request: &Message,
) -> Message {
    let mut response = request.response(node_id);
    match request.kind() {
        Some(MessageType::SendEcdsaKeyShare) => send_key_share(store, session, request, &mut response),
        Some(MessageType::EcdsaInitKeys) => init_keys(store, request, &mut response),
        Some(MessageType::EcdsaRound1) => round1(store, session, request, &mut response),
        Some(MessageType::EcdsaRound2) => round2(session, request, &mut response),
        Some(MessageType::EcdsaRound3) => round3(session, request, &mut response),
        Some(MessageType::EcdsaGetSignature) => get_signature(session, request, &mut response),
        Some(MessageType::DeleteEcdsaKeyShare) => delete_key_share(store, session, request, &mut response),
        _ => response.error = ErrorCode::InvalidMessage,
    }
    response
}

fn send_key_share(
    store: &KeyStore,
    session: &mut Option<ActiveSession>,
    request: &Message,
    response: &mut Message,
) {
    let Some((key_id, rest)) = key_id_and_rest(request) else {
        response.error = ErrorCode::InvalidMessage;
        return;
    };
    info!(%key_id, "installing ECDSA key share");
    let mut share: EcdsaKeyShare = match rest.first().map(|bytes| encoding::decode(bytes)) {
        Some(Ok(share)) => share,
        _ => {
            warn!(%key_id, "cannot decode ECDSA key share");
            response.error = ErrorCode::Decoding;
            return;
        }
    };
    let meta: EcdsaKeyMeta = match rest.get(1).map(|bytes| encoding::decode(bytes)) {
        Some(Ok(meta)) => meta,
        _ => {
            warn!(%key_id, "cannot decode ECDSA key meta");
            response.error = ErrorCode::Decoding;
            return;
        }
    };
    // A (re)installed share always starts uninitialized; the init exchange
    // has to run again before the key can sign.
    share.clear_group();
    let init_message = match share.init(&meta) {
        Ok(init_message) => init_message,
        Err(error) => {
            warn!(%key_id, %error, "cannot derive key init message");
            response.error = ErrorCode::Internal;
            return;
        }
    };
    let encoded = match encoding::encode(&init_message) {
        Ok(encoded) => encoded,
        Err(error) => {
            warn!(%key_id, %error, "cannot encode key init message");
            response.error = ErrorCode::Encoding;
            return;
        }
    };
    if let Err(error) = store.put_ecdsa_key(&key_id, share, meta) {
        warn!(%key_id, %error, "cannot persist ECDSA key share");
        response.error = ErrorCode::Internal;
        return;
    }
    if session.as_ref().is_some_and(|active| active.key_id == key_id) {
        debug!(%key_id, "discarding signing session for replaced key");
        *session = None;
    }
    info!(%key_id, "ECDSA key share installed, awaiting init exchange");
    response.push_data(encoded);
}

fn init_keys(store: &KeyStore, request: &Message, response: &mut Message) {
    let Some((key_id, rest)) = key_id_and_rest(request) else {
        response.error = ErrorCode::InvalidMessage;
        return;
    };
    info!(%key_id, "completing ECDSA init exchange");
    let messages: Vec<KeyInitMessage> = match rest.first().map(|bytes| encoding::decode(bytes)) {
        Some(Ok(messages)) => messages,
        _ => {
            warn!(%key_id, "cannot decode key init message list");
            response.error = ErrorCode::Decoding;
            return;
        }
    };
    let Some(mut material) = store.ecdsa_material(&key_id) else {
        warn!(%key_id, "init exchange for unknown key");
        response.error = ErrorCode::KeyNotFound;
        return;
    };
    if let Err(error) = material.share.set_key(&material.meta, &messages) {
        warn!(%key_id, %error, "init exchange failed");
        response.error = ErrorCode::Internal;
        return;
    }
    if let Err(error) = store.put_ecdsa_key(&key_id, material.share, material.meta) {
        warn!(%key_id, %error, "cannot persist initialized ECDSA key");
        response.error = ErrorCode::Internal;
        return;
    }
    info!(%key_id, "ECDSA key ready for signing");
}

fn round1(
    store: &KeyStore,
    session: &mut Option<ActiveSession>,
    request: &Message,
    response: &mut Message,
) {
    let Some((key_id, rest)) = key_id_and_rest(request) else {
        response.error = ErrorCode::InvalidMessage;
        return;
    };
    let Some(digest) = rest.first() else {
        response.error = ErrorCode::InvalidMessage;
        return;
    };
    let Some(material) = store.ecdsa_material(&key_id) else {
        warn!(%key_id, "signing requested for unknown key");
        response.error = ErrorCode::KeyNotFound;
        return;
    };
    if !material.share.is_initialized() {
        warn!(%key_id, "signing requested before init exchange");
        response.error = ErrorCode::NotInitialized;
        return;
    }
    info!(%key_id, digest = %BASE64.encode(digest), "opening signing session");
    if let Some(previous) = session.take() {
        debug!(key_id = %previous.key_id, "discarding in-flight signing session");
    }
    match material.share.begin_signing(&material.meta, digest) {
        Ok((stage, message)) => match encoding::encode(&message) {
            Ok(encoded) => {
                *session = Some(ActiveSession { key_id, stage: SigningStage::AwaitingRound2(stage) });
                response.push_data(encoded);
            }
            Err(error) => {
                warn!(%key_id, %error, "cannot encode round 1 message");
                response.error = ErrorCode::Encoding;
            }
        },
        Err(error) => {
            warn!(%key_id, %error, "cannot open signing session");
            response.error = signing_error_code(&error);
        }
    }
}

fn round2(session: &mut Option<ActiveSession>, request: &Message, response: &mut Message) {
    match session.take() {
        Some(ActiveSession { key_id, stage: SigningStage::AwaitingRound2(stage) }) => {
            let messages: Vec<Round1Message> = match request.data.first().map(|bytes| encoding::decode(bytes)) {
                Some(Ok(messages)) => messages,
                _ => {
                    warn!(%key_id, "cannot decode round 1 message list");
                    response.error = ErrorCode::Decoding;
                    *session = Some(ActiveSession { key_id, stage: SigningStage::AwaitingRound2(stage) });
                    return;
                }
            };
            info!(%key_id, "running signing round 2");
            match stage.round2(&messages) {
                Ok((next, message)) => match encoding::encode(&message) {
                    Ok(encoded) => {
                        *session = Some(ActiveSession { key_id, stage: SigningStage::AwaitingRound3(next) });
                        response.push_data(encoded);
                    }
                    Err(error) => {
                        warn!(%key_id, %error, "cannot encode round 2 message");
                        response.error = ErrorCode::Encoding;
                    }
                },
                Err(error) => {
                    warn!(%key_id, %error, "signing round 2 failed, session discarded");
                    response.error = ErrorCode::Internal;
                }
            }
        }
        other => {
            warn!("round 2 without a session awaiting it");
            *session = other;
            response.error = ErrorCode::NotInitialized;
        }
    }
}

fn round3(session: &mut Option<ActiveSession>, request: &Message, response: &mut Message) {
    match session.take() {
        Some(ActiveSession { key_id, stage: SigningStage::AwaitingRound3(stage) }) => {
            let messages: Vec<Round2Message> = match request.data.first().map(|bytes| encoding::decode(bytes)) {
                Some(Ok(messages)) => messages,
                _ => {
                    warn!(%key_id, "cannot decode round 2 message list");
                    response.error = ErrorCode::Decoding;
                    *session = Some(ActiveSession { key_id, stage: SigningStage::AwaitingRound3(stage) });
                    return;
                }
            };
            info!(%key_id, "running signing round 3");
            match stage.round3(&messages) {
                Ok((next, message)) => match encoding::encode(&message) {
                    Ok(encoded) => {
                        *session =
                            Some(ActiveSession { key_id, stage: SigningStage::AwaitingSignature(next) });
                        response.push_data(encoded);
                    }
                    Err(error) => {
                        warn!(%key_id, %error, "cannot encode round 3 message");
                        response.error = ErrorCode::Encoding;
                    }
                },
                Err(error) => {
                    warn!(%key_id, %error, "signing round 3 failed, session discarded");
                    response.error = ErrorCode::Internal;
                }
            }
        }
        other => {
            warn!("round 3 without a session awaiting it");
            *session = other;
            response.error = ErrorCode::NotInitialized;
        }
    }
}

fn get_signature(session: &mut Option<ActiveSession>, request: &Message, response: &mut Message) {
    match session.take() {
        Some(ActiveSession { key_id, stage: SigningStage::AwaitingSignature(stage) }) => {
            let messages: Vec<Round3Message> = match request.data.first().map(|bytes| encoding::decode(bytes)) {
                Some(Ok(messages)) => messages,
                _ => {
                    warn!(%key_id, "cannot decode round 3 message list");
                    response.error = ErrorCode::Decoding;
                    *session = Some(ActiveSession { key_id, stage: SigningStage::AwaitingSignature(stage) });
                    return;
                }
            };
            info!(%key_id, "combining signature");
            // Whatever happens next, the session is finished.
            match stage.finish(&messages) {
                Ok(signature) => match encoding::encode(&signature) {
                    Ok(encoded) => {
                        info!(%key_id, "signature combined and verified");
                        response.push_data(encoded);
                    }
                    Err(error) => {
                        warn!(%key_id, %error, "cannot encode signature");
                        response.error = ErrorCode::Encoding;
                    }
                },
                Err(error) => {
                    warn!(%key_id, %error, "signature combination failed");
                    response.error = ErrorCode::Internal;
                }
            }
        }
        other => {
            warn!("signature requested without a session awaiting it");
            *session = other;
            response.error = ErrorCode::NotInitialized;
        }
    }
}

fn delete_key_share(
    store: &KeyStore,
    session: &mut Option<ActiveSession>,
    request: &Message,
    response: &mut Message,
) {
    let Some((key_id, _)) = key_id_and_rest(request) else {
        response.error = ErrorCode::InvalidMessage;
        return;
    };
    info!(%key_id, "deleting ECDSA key share");
    if session.as_ref().is_some_and(|active| active.key_id == key_id) {
        debug!(%key_id, "discarding signing session for deleted key");
        *session = None;
    }
    if let Err(error) = store.delete_ecdsa_key(&key_id) {
        warn!(%key_id, %error, "cannot persist ECDSA key deletion");
        response.error = ErrorCode::Internal;
    }
}

fn signing_error_code(error: &SigningError) -> ErrorCode {
    match error {
        SigningError::NotInitialized => ErrorCode::NotInitialized,
        _ => ErrorCode::Internal,
    }
}

fn key_id_and_rest(request: &Message) -> Option<(String, &[Vec<u8>])> {
    let (id, rest) = request.data.split_first()?;
    Some((String::from_utf8_lossy(id).into_owned(), rest))
}
