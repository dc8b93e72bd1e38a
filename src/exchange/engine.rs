//! One bounded CoAP GET exchange.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::context::{CoapContext, ResponseHandler, TransmissionParams};
use super::pdu::{Code, Message, MessageType};
use super::transport::{EndpointFactory, UdpEndpointFactory};
use super::uri::ExchangeDestination;
use super::{ExchangeError, ExchangeOutcome};
use crate::config::DEFAULT_PUMP_SLICE;

/// Lifecycle of one exchange attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    Idle,
    Resolving,
    SessionReady,
    Sent,
    Success,
    Timeout,
    Closed,
}

/// Recorded phase sequence of an attempt.
#[derive(Debug, Clone)]
struct PhaseTrace(Vec<ExchangePhase>);

impl PhaseTrace {
    fn new() -> Self {
        Self(vec![ExchangePhase::Idle])
    }

    fn enter(&mut self, phase: ExchangePhase) {
        if let Some(from) = self.0.last() {
            debug!("exchange: {:?} -> {:?}", from, phase);
        }
        self.0.push(phase);
    }
}

/// One-shot slot written by the response handler.
#[derive(Debug, Clone, Default)]
pub struct ResponseSignal(Arc<OnceLock<Message>>);

impl ResponseSignal {
    /// Create an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler that stores the first response it sees and ignores the rest.
    pub fn handler(&self) -> ResponseHandler {
        let slot = self.0.clone();
        Box::new(move |msg: &Message| {
            if slot.set(msg.clone()).is_err() {
                debug!("duplicate response ignored");
            }
        })
    }

    /// Whether a response arrived.
    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    /// The stored response.
    pub fn get(&self) -> Option<&Message> {
        self.0.get()
    }
}

/// Performs single GET exchanges, each with its own context and session.
pub struct ExchangeEngine<F: EndpointFactory = UdpEndpointFactory> {
    factory: F,
    pump_slice: Duration,
    params: TransmissionParams,
    last_trace: Vec<ExchangePhase>,
}

impl ExchangeEngine<UdpEndpointFactory> {
    /// Engine over UDP sockets.
    pub fn new() -> Self {
        Self::with_factory(UdpEndpointFactory)
    }
}

impl Default for ExchangeEngine<UdpEndpointFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: EndpointFactory> ExchangeEngine<F> {
    /// Engine over the endpoints produced by `factory`.
    pub fn with_factory(factory: F) -> Self {
        Self {
            factory,
            pump_slice: DEFAULT_PUMP_SLICE,
            params: TransmissionParams::default(),
            last_trace: Vec::new(),
        }
    }

    /// Set the I/O pump slice.
    pub fn with_pump_slice(mut self, slice: Duration) -> Self {
        self.pump_slice = slice.max(Duration::from_millis(1));
        self
    }

    /// Set the confirmable transmission parameters.
    pub fn with_transmission_params(mut self, params: TransmissionParams) -> Self {
        self.params = params;
        self
    }

    /// The endpoint factory.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Phases passed through by the most recent exchange.
    pub fn last_trace(&self) -> &[ExchangePhase] {
        &self.last_trace
    }

    /// Send a confirmable GET for `uri` and wait up to `deadline` for the
    /// response. All transport resources are released before returning.
    pub fn run_exchange(&mut self, uri: &str, deadline: Duration) -> ExchangeOutcome {
        info!("CoAP GET {} (deadline {} ms)", uri, deadline.as_millis());

        let mut trace = PhaseTrace::new();
        let result = self.attempt(uri, deadline, &mut trace);
        trace.enter(ExchangePhase::Closed);
        self.last_trace = trace.0;

        match result {
            Ok(response) => {
                info!(
                    "CoAP exchange: SUCCESS {} {}",
                    response.code,
                    String::from_utf8_lossy(&response.payload)
                );
                ExchangeOutcome::Success(response)
            }
            Err(ExchangeError::Timeout) => {
                warn!("CoAP exchange: TIMEOUT after {} ms", deadline.as_millis());
                ExchangeOutcome::Timeout
            }
            Err(e) => {
                error!("CoAP exchange setup failed: {}", e);
                ExchangeOutcome::SetupFailure(e)
            }
        }
    }

    // Locals drop in reverse declaration order: the pending option list
    // (consumed or dropped before the send), then the context with its
    // session.
    fn attempt(
        &self,
        uri: &str,
        deadline: Duration,
        trace: &mut PhaseTrace,
    ) -> Result<Message, ExchangeError> {
        trace.enter(ExchangePhase::Resolving);
        let destination = ExchangeDestination::parse(uri)?;
        let remote = destination.resolve()?;

        let mut context =
            CoapContext::open(&self.factory, remote).map_err(ExchangeError::ContextInit)?;
        context.set_transmission_params(self.params);
        let session = context
            .new_client_session(remote)
            .map_err(ExchangeError::SessionInit)?;
        trace.enter(ExchangePhase::SessionReady);

        let mut request = Message::new(
            MessageType::Confirmable,
            Code::GET,
            session.new_message_id(),
            session.new_token(),
        );
        let max_pdu = session.max_pdu_size();
        let options = destination.to_options()?;
        request
            .attach_options(options, max_pdu)
            .map_err(ExchangeError::PduBuild)?;

        let signal = ResponseSignal::new();
        context.register_response_handler(signal.handler());

        context.send(&request).map_err(ExchangeError::SendFailed)?;
        trace.enter(ExchangePhase::Sent);
        info!("request sent to {}, waiting for response", remote);

        let mut remaining = deadline;
        while !signal.is_set() && !remaining.is_zero() {
            let slice = self.pump_slice.min(remaining);
            match context.io_process(slice) {
                Ok(elapsed) => remaining = remaining.saturating_sub(elapsed.min(slice)),
                Err(e) => {
                    warn!("I/O pump failed: {}", e);
                    remaining = remaining.saturating_sub(slice);
                }
            }
        }

        match signal.get() {
            Some(response) => {
                trace.enter(ExchangePhase::Success);
                Ok(response.clone())
            }
            None => {
                trace.enter(ExchangePhase::Timeout);
                Err(ExchangeError::Timeout)
            }
        }
    }
}
