//! Datagram transport under the CoAP context.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use log::debug;

/// Smallest read timeout handed to the socket; a zero timeout is rejected
/// by `set_read_timeout`.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// A bound datagram socket that exchanges with a single peer.
pub trait DatagramEndpoint: Send {
    /// Fix the peer; later sends go there and only its datagrams are received.
    fn connect(&mut self, remote: SocketAddr) -> io::Result<()>;

    /// Send one datagram to the peer.
    fn send(&mut self, datagram: &[u8]) -> io::Result<usize>;

    /// Wait up to `timeout` for one datagram. `Ok(None)` when nothing arrived.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;

    /// Local address the endpoint is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Opens endpoints for the CoAP context.
pub trait EndpointFactory {
    /// Open an unconnected endpoint able to reach `remote`.
    fn open(&self, remote: SocketAddr) -> io::Result<Box<dyn DatagramEndpoint>>;
}

/// UDP endpoint over the platform socket layer (lwIP on ESP32).
pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    /// Bind an ephemeral port in the address family of `remote`.
    pub fn bind_for(remote: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)?;
        debug!("udp endpoint bound to {}", socket.local_addr()?);
        Ok(Self { socket })
    }
}

impl DatagramEndpoint for UdpEndpoint {
    fn connect(&mut self, remote: SocketAddr) -> io::Result<()> {
        self.socket.connect(remote)
    }

    fn send(&mut self, datagram: &[u8]) -> io::Result<usize> {
        self.socket.send(datagram)
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
        self.socket.set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Drop for UdpEndpoint {
    fn drop(&mut self) {
        debug!("udp endpoint closed");
    }
}

/// Factory producing [`UdpEndpoint`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpEndpointFactory;

impl EndpointFactory for UdpEndpointFactory {
    fn open(&self, remote: SocketAddr) -> io::Result<Box<dyn DatagramEndpoint>> {
        Ok(Box::new(UdpEndpoint::bind_for(remote)?))
    }
}
