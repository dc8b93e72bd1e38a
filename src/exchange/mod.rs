//! CoAP exchange engine.
//!
//! A single confirmable GET per call: parse the URI, resolve the peer,
//! open a context and session, send, then pump I/O in bounded slices
//! until a response arrives or the deadline is consumed.
//!
//! # Components
//!
//! - [`pdu`] - RFC 7252 message codec
//! - [`uri`] - `coap://` parsing, request options and address resolution
//! - [`transport`] - datagram endpoint traits and the UDP implementation
//! - [`context`] - session state, retransmission and the I/O pump
//! - [`engine`] - the exchange lifecycle

pub mod context;
pub mod engine;
#[cfg(test)]
pub(crate) mod mock;
pub mod pdu;
pub mod transport;
pub mod uri;

use std::fmt;
use std::io;

pub use context::{
    ClientSession, CoapContext, ResponseHandler, SendError, TransmissionParams, MAX_BODY_SIZE,
    MAX_PDU_SIZE,
};
pub use engine::{ExchangeEngine, ExchangePhase, ResponseSignal};
pub use pdu::{BlockOption, Code, CoapOption, Message, MessageType, OptionList, PduError};
pub use transport::{DatagramEndpoint, EndpointFactory, UdpEndpoint, UdpEndpointFactory};
pub use uri::{ExchangeDestination, DEFAULT_PORT};

/// Result of one exchange.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// A response arrived within the deadline.
    Success(Message),
    /// The deadline was consumed without a response.
    Timeout,
    /// The exchange could not be set up or sent.
    SetupFailure(ExchangeError),
}

impl ExchangeOutcome {
    /// Whether a response arrived.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The response, on success.
    pub fn response(&self) -> Option<&Message> {
        match self {
            Self::Success(msg) => Some(msg),
            _ => None,
        }
    }
}

impl fmt::Display for ExchangeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(msg) => write!(
                f,
                "{} {}",
                msg.code,
                String::from_utf8_lossy(&msg.payload)
            ),
            Self::Timeout => write!(f, "timeout"),
            Self::SetupFailure(e) => write!(f, "setup failure: {}", e),
        }
    }
}

/// Exchange setup and completion errors.
#[derive(Debug)]
pub enum ExchangeError {
    /// URI is malformed or not `coap://`.
    UriParse(String),
    /// Host did not resolve.
    AddressResolve(String),
    /// Endpoint could not be opened.
    ContextInit(io::Error),
    /// Session could not be bound to the peer.
    SessionInit(io::Error),
    /// Request PDU could not be built.
    PduBuild(PduError),
    /// Request was not handed to the transport.
    SendFailed(SendError),
    /// No response within the deadline.
    Timeout,
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UriParse(reason) => write!(f, "invalid URI: {}", reason),
            Self::AddressResolve(host) => write!(f, "cannot resolve {}", host),
            Self::ContextInit(e) => write!(f, "context setup failed: {}", e),
            Self::SessionInit(e) => write!(f, "session setup failed: {}", e),
            Self::PduBuild(e) => write!(f, "request build failed: {}", e),
            Self::SendFailed(e) => write!(f, "{}", e),
            Self::Timeout => write!(f, "no response before deadline"),
        }
    }
}

impl std::error::Error for ExchangeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ContextInit(e) | Self::SessionInit(e) => Some(e),
            Self::PduBuild(e) => Some(e),
            Self::SendFailed(e) => Some(e),
            _ => None,
        }
    }
}
