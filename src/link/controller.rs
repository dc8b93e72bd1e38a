//! Link controller.
//!
//! Issues connect/disconnect/scan requests to the driver and waits for the
//! event bridge to report the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::bridge::LinkEventBridge;
use super::state::{LinkSnapshot, LinkState};
use super::{LinkDriver, LinkError};
use crate::config::{LinkCredentials, DEFAULT_POLL_INTERVAL};

/// Connection manager over a [`LinkDriver`].
pub struct LinkController<D: LinkDriver> {
    driver: D,
    state: Arc<LinkState>,
    bridge: Arc<LinkEventBridge>,
    subscribed: bool,
    poll_interval: Duration,
}

impl<D: LinkDriver> LinkController<D> {
    /// Create a controller. Call [`initialize`](Self::initialize) before use.
    pub fn new(driver: D) -> Self {
        let state = Arc::new(LinkState::new());
        let bridge = Arc::new(LinkEventBridge::new(state.clone()));
        Self {
            driver,
            state,
            bridge,
            subscribed: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the connection poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Reset link state and scan tally and register the event bridge with
    /// the driver. Registration happens once no matter how often this runs.
    pub fn initialize(&mut self) {
        self.bridge.reset();
        if !self.subscribed {
            self.driver.subscribe(self.bridge.clone());
            self.subscribed = true;
            info!("Wi-Fi event callback initialized");
        }
    }

    /// Submit an association request and return without waiting for it.
    pub fn request_connect(&mut self, credentials: &LinkCredentials) -> Result<(), LinkError> {
        info!("Connecting to Wi-Fi network: {}", credentials.ssid);

        let iface = self.driver.default_interface().ok_or_else(|| {
            warn!("Failed to get Wi-Fi device");
            LinkError::NoInterface
        })?;

        self.bridge.mark_connect_submitted();
        if let Err(e) = self.driver.submit_connect(&iface, credentials) {
            self.bridge.mark_connect_rejected();
            warn!("Failed to connect to Wi-Fi network: {}", e);
            return Err(LinkError::ConnectRejected(e));
        }

        info!("Wi-Fi connection requested on {}", iface);
        Ok(())
    }

    /// Wait until the link is up, checking at least every poll interval.
    pub fn await_connected(&self, timeout: Duration) -> Result<(), LinkError> {
        let started = Instant::now();
        loop {
            if self.state.snapshot().connected {
                info!("Wi-Fi connected successfully");
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!("Wi-Fi connection timeout after {} ms", timeout.as_millis());
                return Err(LinkError::Timeout);
            }

            let slice = self.poll_interval.min(timeout - elapsed);
            let seen = self.state.wait_until(slice, |s| s.connected);
            debug!("Link poll: {:?}", seen);
        }
    }

    /// Submit a disassociation request. Does not wait for it to complete.
    pub fn request_disconnect(&mut self) {
        let Some(iface) = self.driver.default_interface() else {
            warn!("Wi-Fi disconnection skipped: no interface");
            return;
        };

        self.bridge.mark_disconnect_submitted();
        match self.driver.submit_disconnect(&iface) {
            Ok(()) => info!("Wi-Fi disconnection requested"),
            Err(e) => {
                self.bridge.mark_disconnect_rejected();
                warn!("Wi-Fi disconnection request failed: {}", e);
            }
        }
    }

    /// Ask the driver for a scan. Results show up in the log as they arrive.
    pub fn request_scan(&mut self) -> Result<(), LinkError> {
        let iface = self
            .driver
            .default_interface()
            .ok_or(LinkError::NoInterface)?;
        match self.driver.submit_scan(&iface) {
            Ok(()) => {
                info!("Wi-Fi scan requested");
                Ok(())
            }
            Err(e) => {
                warn!("Wi-Fi scan request failed: {}", e);
                Err(LinkError::ConnectRejected(e))
            }
        }
    }

    /// Current link flags.
    pub fn state(&self) -> LinkSnapshot {
        self.state.snapshot()
    }

    /// Access points counted in the current scan cycle.
    pub fn scan_tally(&self) -> u32 {
        self.bridge.scan_tally()
    }

    /// The event bridge registered with the driver.
    pub fn bridge(&self) -> &Arc<LinkEventBridge> {
        &self.bridge
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::{ConnectBehavior, ScriptedDriver};
    use crate::link::{DriverError, LinkEventListener};

    fn creds() -> LinkCredentials {
        LinkCredentials::new("TestNetwork", "password123").unwrap()
    }

    fn controller(driver: ScriptedDriver) -> LinkController<ScriptedDriver> {
        let mut c = LinkController::new(driver).with_poll_interval(Duration::from_millis(10));
        c.initialize();
        c
    }

    // ==================== Initialize Tests ====================

    #[test]
    fn test_initialize_subscribes_once() {
        let mut c = controller(ScriptedDriver::new());
        c.initialize();
        c.initialize();
        assert_eq!(c.driver().subscriptions(), 1);
    }

    #[test]
    fn test_initialize_twice_matches_once() {
        let mut once = controller(ScriptedDriver::new());
        let mut twice = controller(ScriptedDriver::new());
        twice.bridge().on_connect_result(0);
        twice.initialize();

        once.initialize();
        assert_eq!(once.state(), twice.state());
        assert_eq!(once.scan_tally(), twice.scan_tally());
        assert_eq!(twice.state(), LinkSnapshot::default());
    }

    // ==================== Connect Tests ====================

    #[test]
    fn test_request_connect_without_interface() {
        let mut c = controller(ScriptedDriver::new().without_interface());
        assert_eq!(c.request_connect(&creds()), Err(LinkError::NoInterface));
        assert_eq!(c.driver().connect_requests(), 0);
        assert!(!c.state().connecting);
    }

    #[test]
    fn test_request_connect_marks_attempt_submitted() {
        let mut c = controller(ScriptedDriver::new().connect(ConnectBehavior::Silent));
        c.request_connect(&creds()).unwrap();
        assert!(c.state().connecting);
        assert!(!c.state().connected);
    }

    #[test]
    fn test_rejected_connect_rolls_back() {
        let mut c = controller(
            ScriptedDriver::new().connect(ConnectBehavior::Reject(DriverError::Rejected(-12))),
        );
        assert_eq!(
            c.request_connect(&creds()),
            Err(LinkError::ConnectRejected(DriverError::Rejected(-12)))
        );
        assert!(!c.state().connecting);
    }

    #[test]
    fn test_await_connected_after_async_event() {
        let mut c = controller(
            ScriptedDriver::new().connect(ConnectBehavior::After(Duration::from_millis(30), 0)),
        );
        c.request_connect(&creds()).unwrap();
        let start = Instant::now();
        assert_eq!(c.await_connected(Duration::from_secs(5)), Ok(()));
        assert!(start.elapsed() < Duration::from_millis(500));
        assert!(!c.state().connecting);
    }

    #[test]
    fn test_await_connected_times_out() {
        let mut c = controller(ScriptedDriver::new().connect(ConnectBehavior::Silent));
        c.request_connect(&creds()).unwrap();
        let start = Instant::now();
        assert_eq!(
            c.await_connected(Duration::from_millis(50)),
            Err(LinkError::Timeout)
        );
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_await_connected_zero_timeout() {
        let c = controller(ScriptedDriver::new());
        assert_eq!(c.await_connected(Duration::ZERO), Err(LinkError::Timeout));

        c.bridge().on_connect_result(0);
        assert_eq!(c.await_connected(Duration::ZERO), Ok(()));
    }

    #[test]
    fn test_failed_connect_event_ends_in_timeout() {
        let mut c = controller(ScriptedDriver::new().connect(ConnectBehavior::Immediate(7)));
        c.request_connect(&creds()).unwrap();
        assert!(!c.state().connecting);
        assert_eq!(
            c.await_connected(Duration::from_millis(30)),
            Err(LinkError::Timeout)
        );
    }

    // ==================== Disconnect Tests ====================

    #[test]
    fn test_disconnect_is_solicited() {
        let mut c = controller(ScriptedDriver::new().connect(ConnectBehavior::Immediate(0)));
        c.request_connect(&creds()).unwrap();
        assert!(c.state().connected);

        c.request_disconnect();
        assert_eq!(c.driver().disconnect_requests(), 1);
        assert_eq!(c.state(), LinkSnapshot::default());
    }

    #[test]
    fn test_disconnect_without_interface_is_noop() {
        let mut c = controller(ScriptedDriver::new().without_interface());
        c.request_disconnect();
        assert_eq!(c.driver().disconnect_requests(), 0);
        assert!(!c.state().disconnecting);
    }

    // ==================== Scan Tests ====================

    #[test]
    fn test_scan_reports_through_bridge() {
        let mut c = controller(ScriptedDriver::new().scan_results(3));
        c.request_scan().unwrap();
        assert_eq!(c.driver().scan_requests(), 1);
        // ScanDone closes the cycle and resets the tally.
        assert_eq!(c.scan_tally(), 0);
        assert_eq!(c.driver().events_sent(), 4);
    }
}
