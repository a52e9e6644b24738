//! The authenticated reply transport.
//!
//! One ZMQ REP socket over TCP, encrypted and mutually authenticated with
//! the CURVE mechanism. The node is the CURVE server; connections are
//! admitted by a ZAP authenticator running inside the same context, which
//! accepts exactly one peer: the configured coordinator key connecting from
//! the coordinator's resolved address. The authenticator is scoped to the
//! [Transport] value and torn down with it.

use tracing::{debug, warn};

/// Authentication domain shared with the coordinator. Both ends must use
/// the same value or authentication fails outright.
pub const AUTH_DOMAIN: &str = "tchsm";

/// Well-known ZAP endpoint inside a ZMQ context.
const ZAP_ENDPOINT: &str = "inproc://zeromq.zap.01";

/// ZAP protocol version.
const ZAP_VERSION: &[u8] = b"1.0";

/// Poll interval for the authenticator's shutdown flag.
const ZAP_RECV_TIMEOUT_MS: i32 = 100;

/// What the transport needs to come up.
pub struct TransportOptions {
    /// Host to bind on.
    pub bind_host: String,
    /// Port to bind on.
    pub bind_port: u16,
    /// Socket identity; the node id.
    pub identity: String,
    /// The node's private CURVE key (Z85).
    pub secret_key: String,
    /// The coordinator's public CURVE key (Z85).
    pub coordinator_key: String,
    /// The coordinator's resolved IP address.
    pub coordinator_address: String,
}

/// The transport could not be set up or used.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A configured CURVE key is not valid Z85.
    #[error("invalid Z85 curve key in configuration")]
    InvalidCurveKey,
    /// The authenticator thread could not be spawned.
    #[error("cannot spawn authenticator thread: {0}")]
    Spawn(std::io::Error),
    /// The underlying socket failed.
    #[error("socket error: {0}")]
    Socket(#[from] zmq::Error),
}

impl TransportError {
    /// True if the socket is beyond recovery and the listen loop should end.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Socket(zmq::Error::ETERM) | Self::Socket(zmq::Error::ENOTSOCK))
    }
}

/// The bound, authenticated reply socket.
pub struct Transport {
    socket: zmq::Socket,
    endpoint: String,
    // Dropped after the socket, tearing the ZAP handler down with the
    // transport.
    _authenticator: Authenticator,
}

impl Transport {
    /// Start the authenticator and bind the reply socket.
    ///
    /// The authenticator must be running before the socket binds, otherwise
    /// early connections would be admitted unchecked.
    pub fn bind(options: &TransportOptions) -> Result<Self, TransportError> {
        let context = zmq::Context::new();
        let authenticator = Authenticator::start(
            &context,
            options.coordinator_address.clone(),
            options.coordinator_key.clone(),
        )?;

        let secret_key =
            zmq::z85_decode(&options.secret_key).map_err(|_| TransportError::InvalidCurveKey)?;
        let socket = context.socket(zmq::REP)?;
        socket.set_identity(options.identity.as_bytes())?;
        // Do not block context teardown on undelivered replies.
        socket.set_linger(0)?;
        socket.set_zap_domain(AUTH_DOMAIN)?;
        socket.set_curve_server(true)?;
        socket.set_curve_secretkey(&secret_key)?;
        // Port zero asks for an ephemeral port; useful in tests.
        let requested = match options.bind_port {
            0 => format!("tcp://{}:*", options.bind_host),
            port => format!("tcp://{}:{}", options.bind_host, port),
        };
        socket.bind(&requested)?;
        let endpoint = socket.get_last_endpoint()?.unwrap_or(requested);
        Ok(Self { socket, endpoint, _authenticator: authenticator })
    }

    /// The endpoint the socket actually bound to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Block until the next request frame group arrives.
    pub fn receive(&self) -> Result<Vec<Vec<u8>>, TransportError> {
        Ok(self.socket.recv_multipart(0)?)
    }

    /// Send one reply frame group.
    pub fn send(&self, frames: Vec<Vec<u8>>) -> Result<(), TransportError> {
        Ok(self.socket.send_multipart(frames, 0)?)
    }
}

/// The ZAP handler thread, allowing exactly the coordinator.
struct Authenticator {
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Authenticator {
    fn start(
        context: &zmq::Context,
        allowed_address: String,
        allowed_key: String,
    ) -> Result<Self, TransportError> {
        let socket = context.socket(zmq::REP)?;
        socket.bind(ZAP_ENDPOINT)?;
        socket.set_rcvtimeo(ZAP_RECV_TIMEOUT_MS)?;
        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread = std::thread::Builder::new()
            .name("zap-authenticator".into())
            .spawn(move || authenticator_loop(socket, stop_flag, allowed_address, allowed_key))
            .map_err(TransportError::Spawn)?;
        Ok(Self { stop, thread: Some(thread) })
    }
}

impl Drop for Authenticator {
    fn drop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn authenticator_loop(
    socket: zmq::Socket,
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
    allowed_address: String,
    allowed_key: String,
) {
    while !stop.load(std::sync::atomic::Ordering::Relaxed) {
        let frames = match socket.recv_multipart(0) {
            Ok(frames) => frames,
            Err(zmq::Error::EAGAIN) => continue,
            Err(zmq::Error::ETERM) => break,
            Err(error) => {
                warn!(%error, "ZAP handler receive failed");
                break;
            }
        };
        let reply = evaluate_zap_request(&frames, &allowed_address, &allowed_key);
        if let Err(error) = socket.send_multipart(reply, 0) {
            warn!(%error, "ZAP handler reply failed");
            break;
        }
    }
}

// ZAP request: [version, request id, domain, address, identity, mechanism,
// credentials...]; for CURVE the first credential is the raw 32-byte client
// public key. Reply: [version, request id, status code, status text,
// user id, metadata].
fn evaluate_zap_request(frames: &[Vec<u8>], allowed_address: &str, allowed_key: &str) -> Vec<Vec<u8>> {
    let request_id = frames.get(1).cloned().unwrap_or_default();
    let deny = |reason: &str| {
        vec![
            ZAP_VERSION.to_vec(),
            request_id.clone(),
            b"400".to_vec(),
            reason.as_bytes().to_vec(),
            Vec::new(),
            Vec::new(),
        ]
    };

    if frames.first().map(Vec::as_slice) != Some(ZAP_VERSION) {
        return deny("unsupported ZAP version");
    }
    let domain = frames.get(2).map(|f| String::from_utf8_lossy(f).into_owned()).unwrap_or_default();
    if domain != AUTH_DOMAIN {
        debug!(%domain, "rejecting peer from foreign auth domain");
        return deny("unknown domain");
    }
    let address = frames.get(3).map(|f| String::from_utf8_lossy(f).into_owned()).unwrap_or_default();
    if address != allowed_address {
        warn!(%address, "rejecting peer from unauthorized address");
        return deny("address not authorized");
    }
    if frames.get(5).map(Vec::as_slice) != Some(b"CURVE".as_slice()) {
        return deny("mechanism not supported");
    }
    let client_key = match frames.get(6).map(|key| zmq::z85_encode(key)) {
        Some(Ok(key)) => key,
        _ => return deny("malformed credentials"),
    };
    if client_key != allowed_key {
        warn!(%address, "rejecting peer with unauthorized curve key");
        return deny("key not authorized");
    }

    debug!(%address, "coordinator authenticated");
    vec![
        ZAP_VERSION.to_vec(),
        request_id,
        b"200".to_vec(),
        b"OK".to_vec(),
        allowed_key.as_bytes().to_vec(),
        Vec::new(),
    ]
}
