//! CoAP client context: one endpoint, one session, one outstanding
//! confirmable request, and the I/O pump that drives them.
//!
//! # Reliability
//!
//! A confirmable request is retransmitted with exponential backoff until it
//! is acknowledged, reset, or `max_retransmit` resends have gone out. An
//! empty ACK stops retransmission and leaves the request waiting for a
//! separate response. Separate confirmable responses are acknowledged.
//!
//! # Block-wise responses
//!
//! A response carrying Block2 with the more flag set is not delivered. The
//! next block is requested with the same token and a fresh message ID, and
//! the handler sees one response whose payload is the reassembled body.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand_core::{OsRng, RngCore};

use super::pdu::{option, Message, MessageType, PduError};
use super::transport::{DatagramEndpoint, EndpointFactory};

/// Largest PDU a session will build or accept.
pub const MAX_PDU_SIZE: usize = 1152;

/// Receive buffer size. A datagram that fills it is longer than
/// [`MAX_PDU_SIZE`] and is dropped instead of being decoded truncated.
const RECV_BUF_SIZE: usize = MAX_PDU_SIZE + 1;

/// Largest reassembled block-wise body.
pub const MAX_BODY_SIZE: usize = 16 * 1024;

/// Token length used for new requests.
pub const TOKEN_LEN: usize = 4;

/// Callback receiving each response matched to the outstanding request.
pub type ResponseHandler = Box<dyn FnMut(&Message) + Send>;

/// Confirmable-message transmission parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransmissionParams {
    /// Base timeout before the first retransmission.
    pub ack_timeout: Duration,
    /// Upper bound multiplier for the randomised initial timeout.
    pub ack_random_factor: f32,
    /// Number of retransmissions before giving up.
    pub max_retransmit: u32,
}

impl Default for TransmissionParams {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            ack_random_factor: 1.5,
            max_retransmit: 4,
        }
    }
}

impl TransmissionParams {
    /// Initial timeout, uniformly drawn from
    /// `[ack_timeout, ack_timeout * ack_random_factor]`.
    fn initial_timeout(&self) -> Duration {
        let spread = self.ack_random_factor.max(1.0) - 1.0;
        let fraction = (OsRng.next_u32() as f32 / u32::MAX as f32) * spread;
        self.ack_timeout.mul_f32(1.0 + fraction)
    }
}

/// A confirmable request awaiting its response.
#[derive(Debug)]
struct PendingRequest {
    request: Message,
    message_id: u16,
    token: Vec<u8>,
    datagram: Vec<u8>,
    retransmits: u32,
    timeout: Duration,
    next_retransmit: Instant,
    acknowledged: bool,
}

/// Client session bound to one peer.
#[derive(Debug)]
pub struct ClientSession {
    remote: SocketAddr,
    next_message_id: u16,
    max_pdu_size: usize,
    pending: Option<PendingRequest>,
    last_acked: Option<u16>,
    body: Option<Vec<u8>>,
}

impl ClientSession {
    fn new(remote: SocketAddr) -> Self {
        Self {
            remote,
            next_message_id: OsRng.next_u32() as u16,
            max_pdu_size: MAX_PDU_SIZE,
            pending: None,
            last_acked: None,
            body: None,
        }
    }

    /// Peer address.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Largest PDU this session sends.
    pub fn max_pdu_size(&self) -> usize {
        self.max_pdu_size
    }

    /// Allocate the next message ID.
    pub fn new_message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = self.next_message_id.wrapping_add(1);
        id
    }

    /// Generate a fresh random token.
    pub fn new_token(&self) -> Vec<u8> {
        let mut token = vec![0u8; TOKEN_LEN];
        OsRng.fill_bytes(&mut token);
        token
    }

    /// Whether a confirmable request is still unanswered.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.pending.is_some() {
            debug!("session to {} released with request outstanding", self.remote);
        } else {
            debug!("session to {} released", self.remote);
        }
    }
}

/// CoAP client context owning the endpoint and at most one session.
pub struct CoapContext {
    // Dropped first, see the Drop impl.
    session: Option<ClientSession>,
    endpoint: Box<dyn DatagramEndpoint>,
    handler: Option<ResponseHandler>,
    params: TransmissionParams,
    recv_buf: Vec<u8>,
}

impl CoapContext {
    /// Open an endpoint able to reach `remote`.
    pub fn open<F: EndpointFactory + ?Sized>(factory: &F, remote: SocketAddr) -> io::Result<Self> {
        let endpoint = factory.open(remote)?;
        debug!("context created");
        Ok(Self {
            session: None,
            endpoint,
            handler: None,
            params: TransmissionParams::default(),
            recv_buf: vec![0u8; RECV_BUF_SIZE],
        })
    }

    /// Override the transmission parameters for later requests.
    pub fn set_transmission_params(&mut self, params: TransmissionParams) {
        self.params = params;
    }

    /// Register the response handler, replacing any earlier one.
    pub fn register_response_handler(&mut self, handler: ResponseHandler) {
        self.handler = Some(handler);
    }

    /// Create the client session, connecting the endpoint to `remote`.
    pub fn new_client_session(&mut self, remote: SocketAddr) -> io::Result<&mut ClientSession> {
        self.endpoint.connect(remote)?;
        debug!("client session to {}", remote);
        Ok(self.session.insert(ClientSession::new(remote)))
    }

    /// The client session, if one was created.
    pub fn session(&mut self) -> Option<&mut ClientSession> {
        self.session.as_mut()
    }

    /// Send a message on the session. Confirmable messages become the
    /// outstanding request and are retransmitted by [`io_process`].
    ///
    /// [`io_process`]: Self::io_process
    pub fn send(&mut self, msg: &Message) -> Result<u16, SendError> {
        let session = self.session.as_mut().ok_or(SendError::NoSession)?;
        let confirmable = msg.mtype == MessageType::Confirmable;
        if confirmable && session.pending.is_some() {
            return Err(SendError::Busy);
        }

        let datagram = msg.encode().map_err(SendError::Encode)?;
        if datagram.len() > session.max_pdu_size {
            return Err(SendError::Encode(PduError::TooLarge {
                len: datagram.len(),
                max: session.max_pdu_size,
            }));
        }

        self.endpoint.send(&datagram).map_err(SendError::Io)?;
        debug!("sent {}", msg);

        if confirmable {
            let timeout = self.params.initial_timeout();
            session.pending = Some(PendingRequest {
                request: msg.clone(),
                message_id: msg.message_id,
                token: msg.token.clone(),
                datagram,
                retransmits: 0,
                timeout,
                next_retransmit: Instant::now() + timeout,
                acknowledged: false,
            });
        }
        Ok(msg.message_id)
    }

    /// Run one I/O iteration: wait at most `timeout` for a single inbound
    /// datagram, retransmitting the outstanding request when its timer
    /// fires. Returns the time spent.
    pub fn io_process(&mut self, timeout: Duration) -> io::Result<Duration> {
        let start = Instant::now();

        loop {
            let now = Instant::now();
            self.retransmit_due(now)?;

            let elapsed = now.duration_since(start);
            if elapsed >= timeout {
                return Ok(elapsed);
            }

            let mut wait = timeout - elapsed;
            if let Some(due) = self.retransmit_deadline() {
                wait = wait.min(due.saturating_duration_since(now));
            }

            match self.endpoint.recv(&mut self.recv_buf, wait) {
                Ok(Some(n)) if n > MAX_PDU_SIZE => {
                    warn!("dropping datagram larger than {} bytes", MAX_PDU_SIZE);
                    return Ok(start.elapsed());
                }
                Ok(Some(n)) => {
                    let datagram = self.recv_buf[..n].to_vec();
                    self.handle_datagram(&datagram)?;
                    return Ok(start.elapsed());
                }
                Ok(None) => continue,
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    debug!("peer unreachable: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn retransmit_deadline(&self) -> Option<Instant> {
        let pending = self.session.as_ref()?.pending.as_ref()?;
        (!pending.acknowledged).then_some(pending.next_retransmit)
    }

    fn retransmit_due(&mut self, now: Instant) -> io::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(pending) = session.pending.as_mut() else {
            return Ok(());
        };
        if pending.acknowledged || now < pending.next_retransmit {
            return Ok(());
        }

        if pending.retransmits >= self.params.max_retransmit {
            warn!(
                "request {:04x} unacknowledged after {} retransmissions",
                pending.message_id, pending.retransmits
            );
            session.pending = None;
            session.body = None;
            return Ok(());
        }

        pending.retransmits += 1;
        pending.timeout *= 2;
        pending.next_retransmit = now + pending.timeout;
        debug!(
            "retransmit {:04x} ({}/{})",
            pending.message_id, pending.retransmits, self.params.max_retransmit
        );
        self.endpoint.send(&pending.datagram)?;
        Ok(())
    }

    fn handle_datagram(&mut self, datagram: &[u8]) -> io::Result<()> {
        let msg = match Message::decode(datagram) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("dropping malformed datagram: {}", e);
                return Ok(());
            }
        };
        debug!("received {}", msg);

        let Some(session) = self.session.as_mut() else {
            debug!("no session, ignoring");
            return Ok(());
        };

        match msg.mtype {
            MessageType::Acknowledgement | MessageType::Reset => {
                let Some(pending) = session.pending.as_mut() else {
                    return Ok(());
                };
                if pending.message_id != msg.message_id {
                    debug!("{:?} for unknown id {:04x}", msg.mtype, msg.message_id);
                    return Ok(());
                }
                if msg.mtype == MessageType::Reset {
                    warn!("request {:04x} reset by peer", msg.message_id);
                    session.pending = None;
                    session.body = None;
                } else if msg.is_empty() {
                    debug!("request acknowledged, awaiting separate response");
                    pending.acknowledged = true;
                } else if msg.token != pending.token {
                    // Still an acknowledgement of the request (RFC 7252 5.3.2).
                    warn!(
                        "ACK {:04x} carries a foreign token, awaiting separate response",
                        msg.message_id
                    );
                    pending.acknowledged = true;
                } else if let Some(done) = session.pending.take() {
                    self.complete(done.request, msg)?;
                }
            }
            MessageType::Confirmable | MessageType::NonConfirmable => {
                let confirmable = msg.mtype == MessageType::Confirmable;
                let matches = session
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.token == msg.token && msg.code.is_response());

                if matches {
                    let done = session.pending.take();
                    if confirmable {
                        session.last_acked = Some(msg.message_id);
                        self.reply(&Message::empty_ack(msg.message_id))?;
                    }
                    if let Some(done) = done {
                        self.complete(done.request, msg)?;
                    }
                } else if confirmable && session.last_acked == Some(msg.message_id) {
                    self.reply(&Message::empty_ack(msg.message_id))?;
                } else if confirmable {
                    debug!("rejecting unexpected {:04x}", msg.message_id);
                    self.reply(&Message::reset(msg.message_id))?;
                }
            }
        }
        Ok(())
    }

    /// Finish `request` with `response`, or ask for the next block when the
    /// response is one block of a longer body.
    fn complete(&mut self, request: Message, mut response: Message) -> io::Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let block = match response.block2() {
            Ok(Some(block)) => block,
            Ok(None) => {
                session.body = None;
                self.deliver(&response);
                return Ok(());
            }
            Err(e) => {
                warn!("dropping response: {}", e);
                session.body = None;
                return Ok(());
            }
        };

        let body = session.body.get_or_insert_with(Vec::new);
        if block.offset() != body.len() {
            warn!(
                "block {} out of sequence at offset {}, abandoning body",
                block.num,
                body.len()
            );
            session.body = None;
            return Ok(());
        }
        body.extend_from_slice(&response.payload);
        let received = body.len();

        if !block.more {
            response.payload = session.body.take().unwrap_or_default();
            response.options.retain(|o| o.number != option::BLOCK2);
            self.deliver(&response);
            return Ok(());
        }
        if received > MAX_BODY_SIZE {
            warn!("block-wise body exceeds {} bytes, abandoning", MAX_BODY_SIZE);
            session.body = None;
            return Ok(());
        }
        let next = match block.next() {
            Ok(next) => next,
            Err(e) => {
                warn!("cannot continue block-wise body: {}", e);
                session.body = None;
                return Ok(());
            }
        };

        let mut follow_up = request;
        follow_up.message_id = session.new_message_id();
        follow_up.set_option(next.to_option(option::BLOCK2));
        debug!("requesting block {} ({} bytes so far)", next.num, received);
        self.send(&follow_up).map_err(|e| match e {
            SendError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })?;
        Ok(())
    }

    fn reply(&mut self, msg: &Message) -> io::Result<()> {
        let datagram = msg.encode().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.endpoint.send(&datagram)?;
        debug!("sent {}", msg);
        Ok(())
    }

    fn deliver(&mut self, msg: &Message) {
        info!("response {} ({} bytes)", msg.code, msg.payload.len());
        if let Some(handler) = self.handler.as_mut() {
            handler(msg);
        }
    }
}

impl Drop for CoapContext {
    fn drop(&mut self) {
        self.session.take();
        self.handler.take();
        debug!("context released");
    }
}

/// Why a message could not be sent.
#[derive(Debug)]
pub enum SendError {
    /// No client session exists.
    NoSession,
    /// A confirmable request is already outstanding.
    Busy,
    /// The message could not be encoded.
    Encode(PduError),
    /// The endpoint refused the datagram.
    Io(io::Error),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSession => write!(f, "no session"),
            Self::Busy => write!(f, "request already outstanding"),
            Self::Encode(e) => write!(f, "encode failed: {}", e),
            Self::Io(e) => write!(f, "send failed: {}", e),
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}
