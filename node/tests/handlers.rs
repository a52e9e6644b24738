//! End-to-end handler scenarios, playing coordinator against one or more
//! simulated nodes (no sockets involved; frames go straight through
//! dispatch).

use generic_ec::Scalar;
use node::{handlers::ecdsa::ActiveSession, keystore::KeyStore, node::dispatch};
use node_config::{Config, CoordinatorConfig};
use sha2::{Digest, Sha256};
use std::{path::PathBuf, sync::OnceLock};
use threshold_ecdsa::{EcdsaKeyMeta, EcdsaSignature, KeyInitMessage, Round1Message, Round2Message, Round3Message};
use threshold_rsa::{RsaKeyMeta, RsaKeyShare, RsaSigShare};
use wire::{ErrorCode, Message, MessageType};

const COORDINATOR: &str = "coordinator";

struct TestNode {
    id: String,
    store: KeyStore,
    session: Option<ActiveSession>,
    config_path: PathBuf,
}

impl TestNode {
    fn new(name: &str, dir: &tempfile::TempDir) -> Self {
        let config_path = dir.path().join(format!("{name}.yaml"));
        let store = KeyStore::load(base_config(), config_path.clone()).unwrap();
        Self { id: name.to_string(), store, session: None, config_path }
    }

    fn request(&mut self, kind: MessageType, data: Vec<Vec<u8>>) -> (Message, Message) {
        let request = Message::request(kind, COORDINATOR, data);
        let reply = dispatch(&self.store, &mut self.session, &self.id, request.clone().into_frames());
        (request, reply)
    }

    /// Simulate a process restart: drop all in-memory state and reload from
    /// the persisted config.
    fn restart(&mut self) {
        let config = Config::load(&self.config_path).unwrap();
        self.store = KeyStore::load(config, self.config_path.clone()).unwrap();
        self.session = None;
    }
}

fn base_config() -> Config {
    Config {
        public_key: "npub".into(),
        private_key: "npriv".into(),
        host: "127.0.0.1".into(),
        port: 0,
        coordinator: CoordinatorConfig {
            public_key: "cpub".into(),
            host: "127.0.0.1".into(),
            rsa_keys: vec![],
            ecdsa_keys: vec![],
        },
    }
}

/// Check the response invariants: echoed id and type, correct addressing,
/// and the advertised data arity on success.
fn assert_reply_shape(request: &Message, reply: &Message, node_id: &str) {
    assert_eq!(reply.id, request.id);
    assert_eq!(reply.kind(), request.kind());
    assert_eq!(reply.from, node_id);
    assert_eq!(reply.response_of, COORDINATOR);
    if reply.error.is_ok() {
        let kind = request.kind().unwrap();
        assert_eq!(reply.data.len(), kind.node_data_len());
    } else {
        assert!(reply.data.is_empty());
    }
}

fn dealt_rsa() -> &'static (Vec<RsaKeyShare>, RsaKeyMeta) {
    static DEALT: OnceLock<(Vec<RsaKeyShare>, RsaKeyMeta)> = OnceLock::new();
    DEALT.get_or_init(|| {
        let p = threshold_rsa::generate_safe_prime(256);
        let q = threshold_rsa::generate_safe_prime(256);
        threshold_rsa::deal_shares(&p, &q, 2, 3).unwrap()
    })
}

fn install_rsa_key(node: &mut TestNode, key_id: &str, share_index: usize) {
    let (shares, meta) = dealt_rsa();
    let (request, reply) = node.request(
        MessageType::SendRsaKeyShare,
        vec![
            key_id.as_bytes().to_vec(),
            encoding::encode(&shares[share_index]).unwrap(),
            encoding::encode(meta).unwrap(),
        ],
    );
    assert_reply_shape(&request, &reply, &node.id);
    assert_eq!(reply.error, ErrorCode::Ok);
}

#[test]
fn rsa_happy_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::new("node-a", &dir);
    install_rsa_key(&mut node, "k1", 0);

    let digest = Sha256::digest(b"hello").to_vec();
    let (request, reply) = node.request(
        MessageType::GetRsaSigShare,
        vec![b"k1".to_vec(), digest.clone()],
    );
    assert_reply_shape(&request, &reply, "node-a");
    assert_eq!(reply.error, ErrorCode::Ok);

    let sig_share: RsaSigShare = encoding::decode(&reply.data[0]).unwrap();
    let (_, meta) = dealt_rsa();
    sig_share.verify(&digest, meta).unwrap();
}

#[test]
fn rsa_unknown_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::new("node-a", &dir);
    let digest = Sha256::digest(b"hello").to_vec();
    let (request, reply) = node.request(MessageType::GetRsaSigShare, vec![b"nope".to_vec(), digest]);
    assert_reply_shape(&request, &reply, "node-a");
    assert_eq!(reply.error, ErrorCode::KeyNotFound);
}

#[test]
fn rsa_wrong_arity() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::new("node-a", &dir);
    let (request, reply) = node.request(MessageType::SendRsaKeyShare, vec![b"k1".to_vec()]);
    assert_reply_shape(&request, &reply, "node-a");
    assert_eq!(reply.error, ErrorCode::InvalidMessage);
    assert!(reply.data.is_empty());
}

#[test]
fn rsa_delete_then_sign_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::new("node-a", &dir);
    install_rsa_key(&mut node, "k1", 1);

    let (_, reply) = node.request(MessageType::DeleteRsaKeyShare, vec![b"k1".to_vec()]);
    assert_eq!(reply.error, ErrorCode::Ok);
    // Idempotent: deleting again still succeeds.
    let (_, reply) = node.request(MessageType::DeleteRsaKeyShare, vec![b"k1".to_vec()]);
    assert_eq!(reply.error, ErrorCode::Ok);

    let digest = Sha256::digest(b"hello").to_vec();
    let (_, reply) = node.request(MessageType::GetRsaSigShare, vec![b"k1".to_vec(), digest]);
    assert_eq!(reply.error, ErrorCode::KeyNotFound);
}

#[test]
fn rsa_decode_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::new("node-a", &dir);
    let (_, reply) = node.request(
        MessageType::SendRsaKeyShare,
        vec![b"k1".to_vec(), b"not a share".to_vec(), b"not a meta".to_vec()],
    );
    assert_eq!(reply.error, ErrorCode::Decoding);
}

/// Install an ECDSA key on every node and run the init exchange through the
/// wire messages, as the coordinator would.
fn install_ecdsa_group(nodes: &mut [TestNode], key_id: &str) -> generic_ec::Point<generic_ec::curves::Secp256k1> {
    let meta = EcdsaKeyMeta::new(nodes.len() as u16, 1).unwrap();
    let (shares, public_key) = threshold_ecdsa::deal_shares(&meta);

    let mut init_messages = Vec::new();
    for (node, share) in nodes.iter_mut().zip(&shares) {
        let (request, reply) = node.request(
            MessageType::SendEcdsaKeyShare,
            vec![
                key_id.as_bytes().to_vec(),
                encoding::encode(share).unwrap(),
                encoding::encode(&meta).unwrap(),
            ],
        );
        assert_reply_shape(&request, &reply, &node.id);
        assert_eq!(reply.error, ErrorCode::Ok);
        let init: KeyInitMessage = encoding::decode(&reply.data[0]).unwrap();
        init_messages.push(init);
    }

    let encoded_list = encoding::encode(&init_messages).unwrap();
    for node in nodes.iter_mut() {
        let (request, reply) =
            node.request(MessageType::EcdsaInitKeys, vec![key_id.as_bytes().to_vec(), encoded_list.clone()]);
        assert_reply_shape(&request, &reply, &node.id);
        assert_eq!(reply.error, ErrorCode::Ok);
    }
    public_key
}

/// Drive the four signing exchanges across all nodes and return the decoded
/// signatures.
fn run_signing_flow(nodes: &mut [TestNode], key_id: &str, digest: &[u8]) -> Vec<EcdsaSignature> {
    let mut round1 = Vec::new();
    for node in nodes.iter_mut() {
        let (request, reply) =
            node.request(MessageType::EcdsaRound1, vec![key_id.as_bytes().to_vec(), digest.to_vec()]);
        assert_reply_shape(&request, &reply, &node.id);
        assert_eq!(reply.error, ErrorCode::Ok);
        round1.push(encoding::decode::<Round1Message>(&reply.data[0]).unwrap());
    }

    let encoded = encoding::encode(&round1).unwrap();
    let mut round2 = Vec::new();
    for node in nodes.iter_mut() {
        let (_, reply) = node.request(MessageType::EcdsaRound2, vec![encoded.clone()]);
        assert_eq!(reply.error, ErrorCode::Ok);
        round2.push(encoding::decode::<Round2Message>(&reply.data[0]).unwrap());
    }

    let encoded = encoding::encode(&round2).unwrap();
    let mut round3 = Vec::new();
    for node in nodes.iter_mut() {
        let (_, reply) = node.request(MessageType::EcdsaRound3, vec![encoded.clone()]);
        assert_eq!(reply.error, ErrorCode::Ok);
        round3.push(encoding::decode::<Round3Message>(&reply.data[0]).unwrap());
    }

    let encoded = encoding::encode(&round3).unwrap();
    let mut signatures = Vec::new();
    for node in nodes.iter_mut() {
        let (request, reply) = node.request(MessageType::EcdsaGetSignature, vec![encoded.clone()]);
        assert_reply_shape(&request, &reply, &node.id);
        assert_eq!(reply.error, ErrorCode::Ok);
        signatures.push(encoding::decode::<EcdsaSignature>(&reply.data[0]).unwrap());
    }
    signatures
}

#[test]
fn ecdsa_full_flow() {
    let dir = tempfile::tempdir().unwrap();
    let mut nodes: Vec<_> = ["node-a", "node-b", "node-c"].iter().map(|n| TestNode::new(n, &dir)).collect();
    let public_key = install_ecdsa_group(&mut nodes, "k2");

    let digest = Sha256::digest(b"sign me");
    let signatures = run_signing_flow(&mut nodes, "k2", &digest);

    let digest_scalar = Scalar::from_be_bytes_mod_order(digest);
    for signature in &signatures {
        assert_eq!(signature, &signatures[0]);
        assert!(signature.verify(&public_key, &digest_scalar));
    }

    // The session is gone; asking again without a new round 1 fails.
    let encoded = encoding::encode(&Vec::<Round3Message>::new()).unwrap();
    let (_, reply) = nodes[0].request(MessageType::EcdsaGetSignature, vec![encoded]);
    assert_eq!(reply.error, ErrorCode::NotInitialized);
}

#[test]
fn ecdsa_signing_before_init_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::new("node-a", &dir);
    let meta = EcdsaKeyMeta::new(3, 1).unwrap();
    let (shares, _) = threshold_ecdsa::deal_shares(&meta);

    let (_, reply) = node.request(
        MessageType::SendEcdsaKeyShare,
        vec![b"k2".to_vec(), encoding::encode(&shares[0]).unwrap(), encoding::encode(&meta).unwrap()],
    );
    assert_eq!(reply.error, ErrorCode::Ok);

    let digest = Sha256::digest(b"too early");
    let (_, reply) = node.request(MessageType::EcdsaRound1, vec![b"k2".to_vec(), digest.to_vec()]);
    assert_eq!(reply.error, ErrorCode::NotInitialized);
}

#[test]
fn ecdsa_round_without_session_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut node = TestNode::new("node-a", &dir);
    let encoded = encoding::encode(&Vec::<Round1Message>::new()).unwrap();
    let (_, reply) = node.request(MessageType::EcdsaRound2, vec![encoded]);
    assert_eq!(reply.error, ErrorCode::NotInitialized);
}

#[test]
fn ecdsa_second_round1_replaces_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut nodes: Vec<_> = ["node-a", "node-b", "node-c"].iter().map(|n| TestNode::new(n, &dir)).collect();
    let public_key = install_ecdsa_group(&mut nodes, "k2");

    // Open a session for one digest on every node, then abandon it.
    let abandoned = Sha256::digest(b"abandoned attempt");
    for node in nodes.iter_mut() {
        let (_, reply) =
            node.request(MessageType::EcdsaRound1, vec![b"k2".to_vec(), abandoned.to_vec()]);
        assert_eq!(reply.error, ErrorCode::Ok);
    }

    // A fresh round 1 silently replaces it, and the flow completes against
    // the new digest.
    let digest = Sha256::digest(b"the real document");
    let signatures = run_signing_flow(&mut nodes, "k2", &digest);
    let digest_scalar = Scalar::from_be_bytes_mod_order(digest);
    assert!(signatures[0].verify(&public_key, &digest_scalar));
}

#[test]
fn ecdsa_reinstalling_a_key_discards_its_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut nodes: Vec<_> = ["node-a", "node-b", "node-c"].iter().map(|n| TestNode::new(n, &dir)).collect();
    install_ecdsa_group(&mut nodes, "k2");

    let digest = Sha256::digest(b"doc");
    let (_, reply) = nodes[0].request(MessageType::EcdsaRound1, vec![b"k2".to_vec(), digest.to_vec()]);
    assert_eq!(reply.error, ErrorCode::Ok);

    // Reinstall the key share on the node: completed drops back to false
    // and the open session dies with it.
    let meta = EcdsaKeyMeta::new(3, 1).unwrap();
    let (shares, _) = threshold_ecdsa::deal_shares(&meta);
    let (_, reply) = nodes[0].request(
        MessageType::SendEcdsaKeyShare,
        vec![b"k2".to_vec(), encoding::encode(&shares[0]).unwrap(), encoding::encode(&meta).unwrap()],
    );
    assert_eq!(reply.error, ErrorCode::Ok);

    let encoded = encoding::encode(&Vec::<Round1Message>::new()).unwrap();
    let (_, reply) = nodes[0].request(MessageType::EcdsaRound2, vec![encoded]);
    assert_eq!(reply.error, ErrorCode::NotInitialized);

    let (_, reply) = nodes[0].request(MessageType::EcdsaRound1, vec![b"k2".to_vec(), digest.to_vec()]);
    assert_eq!(reply.error, ErrorCode::NotInitialized);
}

#[test]
fn ecdsa_garbage_round_list_keeps_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut nodes: Vec<_> = ["node-a", "node-b", "node-c"].iter().map(|n| TestNode::new(n, &dir)).collect();
    let public_key = install_ecdsa_group(&mut nodes, "k2");

    let digest = Sha256::digest(b"doc");
    let mut round1 = Vec::new();
    for node in nodes.iter_mut() {
        let (_, reply) = node.request(MessageType::EcdsaRound1, vec![b"k2".to_vec(), digest.to_vec()]);
        assert_eq!(reply.error, ErrorCode::Ok);
        round1.push(encoding::decode::<Round1Message>(&reply.data[0]).unwrap());
    }

    // An undecodable list reports Decoding but leaves the session alive...
    let (_, reply) = nodes[0].request(MessageType::EcdsaRound2, vec![b"garbage".to_vec()]);
    assert_eq!(reply.error, ErrorCode::Decoding);

    // ...so the proper list still advances all three nodes to completion.
    let encoded = encoding::encode(&round1).unwrap();
    let mut round2 = Vec::new();
    for node in nodes.iter_mut() {
        let (_, reply) = node.request(MessageType::EcdsaRound2, vec![encoded.clone()]);
        assert_eq!(reply.error, ErrorCode::Ok);
        round2.push(encoding::decode::<Round2Message>(&reply.data[0]).unwrap());
    }
    let encoded = encoding::encode(&round2).unwrap();
    let mut round3 = Vec::new();
    for node in nodes.iter_mut() {
        let (_, reply) = node.request(MessageType::EcdsaRound3, vec![encoded.clone()]);
        assert_eq!(reply.error, ErrorCode::Ok);
        round3.push(encoding::decode::<Round3Message>(&reply.data[0]).unwrap());
    }
    let encoded = encoding::encode(&round3).unwrap();
    let (_, reply) = nodes[0].request(MessageType::EcdsaGetSignature, vec![encoded]);
    assert_eq!(reply.error, ErrorCode::Ok);
    let signature: EcdsaSignature = encoding::decode(&reply.data[0]).unwrap();
    assert!(signature.verify(&public_key, &Scalar::from_be_bytes_mod_order(digest)));
}

#[test]
fn restart_preserves_keys_and_completed_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut nodes: Vec<_> = ["node-a", "node-b", "node-c"].iter().map(|n| TestNode::new(n, &dir)).collect();

    install_rsa_key(&mut nodes[0], "k1", 0);
    let public_key = install_ecdsa_group(&mut nodes, "k2");

    for node in nodes.iter_mut() {
        node.restart();
    }

    // RSA signing works without a re-install.
    let digest = Sha256::digest(b"after restart").to_vec();
    let (_, reply) = nodes[0].request(MessageType::GetRsaSigShare, vec![b"k1".to_vec(), digest.clone()]);
    assert_eq!(reply.error, ErrorCode::Ok);
    let sig_share: RsaSigShare = encoding::decode(&reply.data[0]).unwrap();
    sig_share.verify(&digest, &dealt_rsa().1).unwrap();

    // The ECDSA key is still completed: a full signing flow succeeds
    // without a new init exchange.
    let digest = Sha256::digest(b"ecdsa after restart");
    let signatures = run_signing_flow(&mut nodes, "k2", &digest);
    assert!(signatures[0].verify(&public_key, &Scalar::from_be_bytes_mod_order(digest)));
}

#[test]
fn ecdsa_delete_removes_key_and_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut nodes: Vec<_> = ["node-a", "node-b", "node-c"].iter().map(|n| TestNode::new(n, &dir)).collect();
    install_ecdsa_group(&mut nodes, "k2");

    let digest = Sha256::digest(b"doc");
    let (_, reply) = nodes[0].request(MessageType::EcdsaRound1, vec![b"k2".to_vec(), digest.to_vec()]);
    assert_eq!(reply.error, ErrorCode::Ok);

    let (_, reply) = nodes[0].request(MessageType::DeleteEcdsaKeyShare, vec![b"k2".to_vec()]);
    assert_eq!(reply.error, ErrorCode::Ok);

    let (_, reply) = nodes[0].request(MessageType::EcdsaRound1, vec![b"k2".to_vec(), digest.to_vec()]);
    assert_eq!(reply.error, ErrorCode::KeyNotFound);
}
