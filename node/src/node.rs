//! Node supervisor: startup, the listen loop, and request dispatch.

use crate::{
    handlers,
    keystore::{KeyStore, LoadKeysError},
    transport::{Transport, TransportError, TransportOptions},
};
use node_config::Config;
use rand::RngCore;
use std::{net::ToSocketAddrs, path::PathBuf};
use tracing::{debug, info, warn};
use wire::{ErrorCode, Message};

/// Number of random bytes behind a node id (hex-encoded to 16 chars).
const NODE_ID_BYTES: usize = 8;

/// The node could not be brought up.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The coordinator host does not resolve.
    #[error("cannot resolve coordinator host {host}: {source}")]
    ResolveCoordinator {
        /// Host from the config.
        host: String,
        /// Resolver error.
        source: std::io::Error,
    },
    /// A persisted key could not be restored.
    #[error(transparent)]
    LoadKeys(#[from] LoadKeysError),
    /// The transport could not be set up.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A running node: fresh identity, preloaded key store, bound transport.
pub struct Node {
    id: String,
    store: KeyStore,
    session: Option<handlers::ecdsa::ActiveSession>,
    transport: Transport,
}

impl Node {
    /// Initialize the node from its configuration.
    ///
    /// Resolves the coordinator, restores the persisted keys (a corrupt
    /// entry is fatal), authorizes the coordinator in the transport and
    /// binds the reply socket.
    pub fn start(config: Config, config_path: PathBuf) -> Result<Self, StartError> {
        let id = fresh_node_id();
        info!(node_id = %id, "starting node");

        let coordinator_host = config.coordinator.host.clone();
        let coordinator_address = resolve_host(&coordinator_host)
            .map_err(|source| StartError::ResolveCoordinator { host: coordinator_host.clone(), source })?;
        debug!(host = %coordinator_host, address = %coordinator_address, "coordinator resolved");

        let options = TransportOptions {
            bind_host: config.host.clone(),
            bind_port: config.port,
            identity: id.clone(),
            secret_key: config.private_key.clone(),
            coordinator_key: config.coordinator.public_key.clone(),
            coordinator_address,
        };
        let store = KeyStore::load(config, config_path)?;
        let transport = Transport::bind(&options)?;
        info!(node_id = %id, endpoint = %transport.endpoint(), "node listening");
        Ok(Self { id, store, session: None, transport })
    }

    /// The node's identity for this run.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The endpoint the transport bound to.
    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// Serve requests until the transport fails fatally.
    pub fn run(&mut self) -> Result<(), TransportError> {
        loop {
            self.serve_one()?;
        }
    }

    /// Receive one request, dispatch it, send exactly one reply.
    ///
    /// Transport hiccups are logged and survived; only a dead socket ends
    /// the listen loop.
    pub fn serve_one(&mut self) -> Result<(), TransportError> {
        let frames = match self.transport.receive() {
            Ok(frames) => frames,
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => {
                warn!(%error, "{}", ErrorCode::ReceiveMessage);
                return Ok(());
            }
        };
        let reply = dispatch(&self.store, &mut self.session, &self.id, frames);
        match self.transport.send(reply.into_frames()) {
            Ok(()) => Ok(()),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                warn!(%error, "{}", ErrorCode::SendResponse);
                Ok(())
            }
        }
    }
}

/// Turn an inbound frame group into the reply to send.
///
/// Every received frame group yields exactly one reply: garbage frames get
/// a parse-failure reply, unknown types and wrong arities get an
/// invalid-message reply, everything else goes to its family handler.
pub fn dispatch(
    store: &KeyStore,
    session: &mut Option<handlers::ecdsa::ActiveSession>,
    node_id: &str,
    frames: Vec<Vec<u8>>,
) -> Message {
    let request = match Message::from_frames(frames) {
        Ok(request) => request,
        Err(error) => {
            warn!(%error, "{}", ErrorCode::ParseMessage);
            return Message::failure(node_id, ErrorCode::ParseMessage);
        }
    };
    let Some(kind) = request.kind() else {
        warn!(kind = request.raw_kind(), "request with unrecognized type");
        let mut response = request.response(node_id);
        response.error = ErrorCode::InvalidMessage;
        return response;
    };
    if request.data.len() != kind.client_data_len() {
        warn!(%kind, got = request.data.len(), expected = kind.client_data_len(), "request with wrong arity");
        let mut response = request.response(node_id);
        response.error = ErrorCode::InvalidMessage;
        return response;
    }
    debug!(%kind, id = %request.id, from = %request.from, "dispatching request");
    if kind.is_rsa() {
        handlers::rsa::handle(store, node_id, &request)
    } else if kind.is_ecdsa() {
        handlers::ecdsa::handle(store, session, node_id, &request)
    } else {
        // `None` is the only type in neither family.
        let mut response = request.response(node_id);
        response.error = ErrorCode::InvalidMessage;
        response
    }
}

fn fresh_node_id() -> String {
    let mut bytes = [0u8; NODE_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn resolve_host(host: &str) -> Result<String, std::io::Error> {
    // Port zero is a placeholder; only the address part is used.
    let mut addresses = (host, 0u16).to_socket_addrs()?;
    match addresses.next() {
        Some(address) => Ok(address.ip().to_string()),
        None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no addresses")),
    }
}
