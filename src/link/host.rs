//! Host link driver.
//!
//! On host systems the OS owns networking, so there is no association to
//! perform. This driver accepts requests and answers them from a helper
//! thread after a short delay, the way a radio driver answers from its
//! event task.

use std::net::IpAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::info;

use super::event::{LinkEventListener, ScanEntry, STATUS_OK};
use super::{DriverError, InterfaceId, LinkDriver};
use crate::config::{LinkCredentials, SecurityMode};

/// Default delay before the simulated association completes.
pub const DEFAULT_ASSOCIATION_DELAY: Duration = Duration::from_millis(50);

/// Host interface name.
const HOST_INTERFACE: &str = "host0";

/// Simulated link driver for host runs.
pub struct HostLinkDriver {
    listener: Option<Arc<dyn LinkEventListener>>,
    association_delay: Duration,
    connect_status: i32,
    workers: Vec<JoinHandle<()>>,
}

impl HostLinkDriver {
    /// Create a host driver whose associations always succeed.
    pub fn new() -> Self {
        Self {
            listener: None,
            association_delay: DEFAULT_ASSOCIATION_DELAY,
            connect_status: STATUS_OK,
            workers: Vec::new(),
        }
    }

    /// Change how long the simulated association takes.
    pub fn with_association_delay(mut self, delay: Duration) -> Self {
        self.association_delay = delay;
        self
    }

    /// Report `status` for every connect request instead of success.
    pub fn with_connect_status(mut self, status: i32) -> Self {
        self.connect_status = status;
        self
    }

    /// Get the primary local IP address.
    ///
    /// Creates a UDP socket and "connects" it to a public IP (nothing is
    /// sent), then checks which local address the OS picked.
    pub fn detect_local_ip() -> Option<IpAddr> {
        use std::net::UdpSocket;

        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }

    fn spawn_event(&mut self, event: impl FnOnce(&dyn LinkEventListener) + Send + 'static) {
        let Some(listener) = self.listener.clone() else {
            return;
        };
        let delay = self.association_delay;
        self.workers.retain(|w| !w.is_finished());
        self.workers.push(thread::spawn(move || {
            thread::sleep(delay);
            event(listener.as_ref());
        }));
    }
}

impl Default for HostLinkDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkDriver for HostLinkDriver {
    fn default_interface(&self) -> Option<InterfaceId> {
        Some(InterfaceId::new(HOST_INTERFACE))
    }

    fn subscribe(&mut self, listener: Arc<dyn LinkEventListener>) {
        self.listener = Some(listener);
    }

    fn submit_connect(
        &mut self,
        _iface: &InterfaceId,
        credentials: &LinkCredentials,
    ) -> Result<(), DriverError> {
        let status = self.connect_status;
        let ssid = credentials.ssid.clone();
        self.spawn_event(move |listener| {
            if status == STATUS_OK {
                match Self::detect_local_ip() {
                    Some(ip) => info!("Host network ready for '{}', local IP: {}", ssid, ip),
                    None => info!("Host network ready for '{}'", ssid),
                }
            }
            listener.on_connect_result(status);
        });
        Ok(())
    }

    fn submit_disconnect(&mut self, _iface: &InterfaceId) -> Result<(), DriverError> {
        self.spawn_event(|listener| listener.on_disconnect_result(STATUS_OK));
        Ok(())
    }

    fn submit_scan(&mut self, _iface: &InterfaceId) -> Result<(), DriverError> {
        self.spawn_event(|listener| {
            listener.on_scan_result(&ScanEntry {
                ssid: "host-network".to_string(),
                channel: 0,
                rssi: 0,
                security: SecurityMode::Open,
            });
            listener.on_scan_done(STATUS_OK);
        });
        Ok(())
    }
}

impl Drop for HostLinkDriver {
    fn drop(&mut self) {
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkController, LinkError};

    fn creds() -> LinkCredentials {
        LinkCredentials::new("TestNetwork", "password123").unwrap()
    }

    #[test]
    fn test_host_driver_has_interface() {
        let driver = HostLinkDriver::new();
        assert_eq!(driver.default_interface(), Some(InterfaceId::new("host0")));
    }

    #[test]
    fn test_host_driver_connects_asynchronously() {
        let driver = HostLinkDriver::new().with_association_delay(Duration::from_millis(20));
        let mut controller = LinkController::new(driver);
        controller.initialize();

        controller.request_connect(&creds()).unwrap();
        assert!(controller.state().connecting);
        assert_eq!(controller.await_connected(Duration::from_secs(5)), Ok(()));
        assert!(!controller.state().connecting);
    }

    #[test]
    fn test_host_driver_failure_status() {
        let driver = HostLinkDriver::new()
            .with_association_delay(Duration::from_millis(5))
            .with_connect_status(-1);
        let mut controller = LinkController::new(driver);
        controller.initialize();

        controller.request_connect(&creds()).unwrap();
        assert_eq!(
            controller.await_connected(Duration::from_millis(100)),
            Err(LinkError::Timeout)
        );
        assert!(!controller.state().connecting);
    }

    #[test]
    fn test_detect_local_ip() {
        // May be None in air-gapped environments; just make sure it doesn't panic.
        if let Some(addr) = HostLinkDriver::detect_local_ip() {
            assert!(addr.is_ipv4() || addr.is_ipv6());
        }
    }
}
