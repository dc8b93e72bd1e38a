//! In-memory transport for exchange tests.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::pdu::Message;
use super::transport::{DatagramEndpoint, EndpointFactory};

/// Produces raw reply datagrams for each message the client sends.
pub type Responder = Box<dyn FnMut(&Message) -> Vec<Vec<u8>> + Send>;

/// Endpoint factory whose endpoints answer through a scripted responder
/// and count how many are alive.
pub struct MockFactory {
    opened: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<Message>>>,
    responder: Arc<Mutex<Responder>>,
    fail_open: bool,
    fail_connect: bool,
    fail_send: bool,
}

impl MockFactory {
    /// A factory whose peer never answers.
    pub fn silent() -> Self {
        Self::answering(|_| Vec::new())
    }

    /// A factory whose peer answers with `responder`.
    pub fn answering(responder: impl FnMut(&Message) -> Vec<Vec<u8>> + Send + 'static) -> Self {
        Self {
            opened: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(Mutex::new(Box::new(responder))),
            fail_open: false,
            fail_connect: false,
            fail_send: false,
        }
    }

    /// Fail every `open`.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Fail every `connect`.
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Fail every `send`.
    pub fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Endpoints ever opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Endpoints currently alive.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Every message the client sent, in order.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

impl EndpointFactory for MockFactory {
    fn open(&self, _remote: SocketAddr) -> io::Result<Box<dyn DatagramEndpoint>> {
        if self.fail_open {
            return Err(io::Error::new(io::ErrorKind::Other, "no sockets"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockEndpoint {
            live: self.live.clone(),
            sent: self.sent.clone(),
            responder: self.responder.clone(),
            inbox: VecDeque::new(),
            fail_connect: self.fail_connect,
            fail_send: self.fail_send,
        }))
    }
}

struct MockEndpoint {
    live: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<Message>>>,
    responder: Arc<Mutex<Responder>>,
    inbox: VecDeque<Vec<u8>>,
    fail_connect: bool,
    fail_send: bool,
}

impl DatagramEndpoint for MockEndpoint {
    fn connect(&mut self, _remote: SocketAddr) -> io::Result<()> {
        if self.fail_connect {
            return Err(io::Error::new(io::ErrorKind::AddrNotAvailable, "connect refused"));
        }
        Ok(())
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        if self.fail_send {
            return Err(io::Error::new(io::ErrorKind::Other, "link down"));
        }
        let msg = Message::decode(datagram)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let replies = {
            let mut responder = self.responder.lock().unwrap();
            (*responder)(&msg)
        };
        self.sent.lock().unwrap().push(msg);
        self.inbox.extend(replies);
        Ok(datagram.len())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        match self.inbox.pop_front() {
            // Truncates like a datagram socket read.
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok(Some(n))
            }
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 40000)))
    }
}

impl Drop for MockEndpoint {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
