//! Link event bridge.
//!
//! The only writer of [`LinkState`]. Registered with the driver as its
//! [`LinkEventListener`]; the controller also routes its own "request
//! submitted" markers through here so every flag flip has one owner.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};

use super::event::{transition, LinkEvent, LinkEventListener, Notice, ScanEntry};
use super::state::{LinkSnapshot, LinkState};

/// Applies management events to the shared link state.
#[derive(Debug)]
pub struct LinkEventBridge {
    state: Arc<LinkState>,
    scan_tally: AtomicU32,
    /// Serializes event application so tally and flags move together.
    apply_lock: Mutex<()>,
}

impl LinkEventBridge {
    /// Create a bridge writing into `state`.
    pub fn new(state: Arc<LinkState>) -> Self {
        Self {
            state,
            scan_tally: AtomicU32::new(0),
            apply_lock: Mutex::new(()),
        }
    }

    /// Clear all flags and the scan tally.
    pub fn reset(&self) {
        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.scan_tally.store(0, Ordering::SeqCst);
        self.state.update(|s| *s = LinkSnapshot::default());
    }

    /// Access points counted in the current scan cycle.
    pub fn scan_tally(&self) -> u32 {
        self.scan_tally.load(Ordering::SeqCst)
    }

    /// The state cell this bridge writes.
    pub fn state(&self) -> &Arc<LinkState> {
        &self.state
    }

    /// Apply one event.
    pub fn handle(&self, event: &LinkEvent) {
        let _guard = self.apply_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let tally = self.scan_tally.load(Ordering::SeqCst);
        let notice = self.state.update(|link| {
            let next = transition(*link, tally, event);
            *link = next.link;
            self.scan_tally.store(next.scan_tally, Ordering::SeqCst);
            next.notice
        });
        report(notice, event);
    }

    /// Record that a connect request is about to be handed to the driver.
    pub(crate) fn mark_connect_submitted(&self) {
        self.state.update(|s| s.connecting = true);
    }

    /// The driver refused the connect request; nothing is in flight.
    pub(crate) fn mark_connect_rejected(&self) {
        self.state.update(|s| s.connecting = false);
    }

    /// Record that a disconnect request is about to be handed to the driver.
    pub(crate) fn mark_disconnect_submitted(&self) {
        self.state.update(|s| s.disconnecting = true);
    }

    /// The driver refused the disconnect request.
    pub(crate) fn mark_disconnect_rejected(&self) {
        self.state.update(|s| s.disconnecting = false);
    }
}

impl LinkEventListener for LinkEventBridge {
    fn on_scan_result(&self, entry: &ScanEntry) {
        self.handle(&LinkEvent::ScanResult(entry.clone()));
    }

    fn on_scan_done(&self, status: i32) {
        self.handle(&LinkEvent::ScanDone { status });
    }

    fn on_connect_result(&self, status: i32) {
        self.handle(&LinkEvent::ConnectResult { status });
    }

    fn on_disconnect_result(&self, status: i32) {
        self.handle(&LinkEvent::DisconnectResult { status });
    }

    fn dispatch(&self, event: &LinkEvent) {
        self.handle(event);
    }
}

fn report(notice: Notice, event: &LinkEvent) {
    match notice {
        Notice::ScanRow { index } => {
            if let LinkEvent::ScanResult(entry) = event {
                if index == 1 {
                    info!(
                        "{:<4} | {:<32} {:<5} | {:<4} | {:<4} | {:<8}",
                        "Num", "SSID", "(len)", "Chan", "RSSI", "Sec"
                    );
                }
                info!(
                    "{:<4} | {:<32} {:<5} | {:<4} | {:<4} | {:<8}",
                    index,
                    entry.ssid,
                    entry.ssid.len(),
                    entry.channel,
                    entry.rssi,
                    entry.security.to_string()
                );
            }
        }
        Notice::ScanComplete => info!("Wi-Fi scan done"),
        Notice::ScanFailed(status) => warn!("Wi-Fi scan failed ({})", status),
        Notice::Connected => info!("Wi-Fi connected"),
        Notice::ConnectFailed(status) => warn!("Wi-Fi connection request failed ({})", status),
        Notice::DisconnectDone => info!("Wi-Fi disconnection done"),
        Notice::DisconnectFailed(status) => warn!("Wi-Fi disconnection failed ({})", status),
        Notice::Dropped => warn!("Wi-Fi link dropped"),
    }
    debug!("Link event applied: {:?}", event);
}
