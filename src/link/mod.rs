//! Wireless link management.
//!
//! # Components
//!
//! - [`event`] - management events and the pure transition over them
//! - [`state`] - shared link state cell
//! - [`bridge`] - event bridge, the only writer of link state
//! - [`controller`] - connect/disconnect requests and connection polling
//! - [`retry`] - bounded connection-establishment policy
//! - [`host`] - simulated driver for host runs and tests
//! - `esp` - ESP-IDF Wi-Fi station driver (ESP32 only)
//! - `storage` - NVS persistence for credentials (ESP32 only)

mod bridge;
mod controller;
mod event;
mod host;
#[cfg(test)]
pub(crate) mod mock;
mod retry;
mod state;

#[cfg(feature = "esp32")]
mod esp;
#[cfg(feature = "esp32")]
mod storage;

use std::fmt;
use std::sync::Arc;

use crate::config::LinkCredentials;

pub use bridge::LinkEventBridge;
pub use controller::LinkController;
pub use event::{transition, LinkEvent, LinkEventListener, Notice, ScanEntry, Transition, STATUS_OK};
pub use host::HostLinkDriver;
pub use retry::RetryPolicy;
pub use state::{LinkSnapshot, LinkState};

#[cfg(feature = "esp32")]
pub use esp::EspLinkDriver;
#[cfg(feature = "esp32")]
pub use storage::{clear_credentials, init_nvs, load_credentials, save_credentials};

/// Name of a network interface known to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceId(String);

impl InterfaceId {
    /// Create an interface identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The interface name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network driver boundary.
///
/// Requests are fire-and-forget: a successful return only means the driver
/// accepted the request. Outcomes arrive later through the subscribed
/// [`LinkEventListener`], possibly from another thread.
pub trait LinkDriver: Send {
    /// The default interface, if the driver has one.
    fn default_interface(&self) -> Option<InterfaceId>;

    /// Register the listener for scan, connect and disconnect events.
    fn subscribe(&mut self, listener: Arc<dyn LinkEventListener>);

    /// Submit an association request.
    fn submit_connect(
        &mut self,
        iface: &InterfaceId,
        credentials: &LinkCredentials,
    ) -> Result<(), DriverError>;

    /// Submit a disassociation request.
    fn submit_disconnect(&mut self, iface: &InterfaceId) -> Result<(), DriverError>;

    /// Submit a scan request.
    fn submit_scan(&mut self, iface: &InterfaceId) -> Result<(), DriverError>;
}

/// A driver refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The radio is not started or not in station mode.
    NotReady,
    /// The driver rejected the request with a platform error code.
    Rejected(i32),
    /// The credentials cannot be expressed in the driver's configuration.
    InvalidCredentials(&'static str),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "driver not ready"),
            Self::Rejected(code) => write!(f, "request rejected ({})", code),
            Self::InvalidCredentials(what) => write!(f, "invalid credentials: {}", what),
        }
    }
}

impl std::error::Error for DriverError {}

/// Errors from link operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// No default network interface.
    NoInterface,
    /// The driver refused the connect request.
    ConnectRejected(DriverError),
    /// The link did not come up in time.
    Timeout,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInterface => write!(f, "no network interface"),
            Self::ConnectRejected(e) => write!(f, "connect rejected: {}", e),
            Self::Timeout => write!(f, "timed out waiting for link"),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConnectRejected(e) => Some(e),
            _ => None,
        }
    }
}
