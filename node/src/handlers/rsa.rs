//! RSA request handlers. Single-shot; no session state.

use crate::keystore::KeyStore;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use threshold_rsa::{RsaKeyMeta, RsaKeyShare};
use tracing::{info, warn};
use wire::{ErrorCode, Message, MessageType};

/// Handle an RSA-family request. Always returns a framed reply.
pub fn handle(store: &KeyStore, node_id: &str, request: &Message) -> Message {
    let mut response = request.response(node_id);
    match request.kind() {
        Some(MessageType::SendRsaKeyShare) => send_key_share(store, request, &mut response),
        Some(MessageType::GetRsaSigShare) => get_sig_share(store, request, &mut response),
        Some(MessageType::DeleteRsaKeyShare) => delete_key_share(store, request, &mut response),
        _ => response.error = ErrorCode::InvalidMessage,
    }
    response
}

fn send_key_share(store: &KeyStore, request: &Message, response: &mut Message) {
    let Some((key_id, rest)) = key_id_and_rest(request) else {
        response.error = ErrorCode::InvalidMessage;
        return;
    };
    info!(%key_id, "installing RSA key share");
    let share: RsaKeyShare = match rest.first().map(|bytes| encoding::decode(bytes)) {
        Some(Ok(share)) => share,
        _ => {
            warn!(%key_id, "cannot decode RSA key share");
            response.error = ErrorCode::Decoding;
            return;
        }
    };
    let meta: RsaKeyMeta = match rest.get(1).map(|bytes| encoding::decode(bytes)) {
        Some(Ok(meta)) => meta,
        _ => {
            warn!(%key_id, "cannot decode RSA key meta");
            response.error = ErrorCode::Decoding;
            return;
        }
    };
    if let Err(error) = store.put_rsa_key(&key_id, share, meta) {
        warn!(%key_id, %error, "cannot persist RSA key share");
        response.error = ErrorCode::Internal;
        return;
    }
    info!(%key_id, "RSA key share installed");
}

fn get_sig_share(store: &KeyStore, request: &Message, response: &mut Message) {
    let Some((key_id, rest)) = key_id_and_rest(request) else {
        response.error = ErrorCode::InvalidMessage;
        return;
    };
    let Some(digest) = rest.first() else {
        response.error = ErrorCode::InvalidMessage;
        return;
    };
    let Some(material) = store.rsa_material(&key_id) else {
        warn!(%key_id, "RSA signing requested for unknown key");
        response.error = ErrorCode::KeyNotFound;
        return;
    };
    // Only the hashed document may appear in logs, and only encoded.
    let digest_b64 = BASE64.encode(digest);
    info!(%key_id, digest = %digest_b64, "producing RSA signature share");
    let sig_share = match material.share.sign(digest, &material.meta) {
        Ok(sig_share) => sig_share,
        Err(error) => {
            warn!(%key_id, %error, "cannot produce RSA signature share");
            response.error = ErrorCode::DocSign;
            return;
        }
    };
    // Reject our own share before the coordinator sees it.
    if let Err(error) = sig_share.verify(digest, &material.meta) {
        warn!(%key_id, %error, "produced RSA signature share does not verify");
        response.error = ErrorCode::DocSign;
        return;
    }
    match encoding::encode(&sig_share) {
        Ok(encoded) => {
            info!(%key_id, digest = %digest_b64, "RSA signature share produced");
            response.push_data(encoded);
        }
        Err(error) => {
            warn!(%key_id, %error, "cannot encode RSA signature share");
            response.error = ErrorCode::Encoding;
        }
    }
}

fn delete_key_share(store: &KeyStore, request: &Message, response: &mut Message) {
    let Some((key_id, _)) = key_id_and_rest(request) else {
        response.error = ErrorCode::InvalidMessage;
        return;
    };
    info!(%key_id, "deleting RSA key share");
    if let Err(error) = store.delete_rsa_key(&key_id) {
        warn!(%key_id, %error, "cannot persist RSA key deletion");
        response.error = ErrorCode::Internal;
    }
}

fn key_id_and_rest(request: &Message) -> Option<(String, &[Vec<u8>])> {
    let (id, rest) = request.data.split_first()?;
    Some((String::from_utf8_lossy(id).into_owned(), rest))
}
