//! Link management events and the pure state transition over them.
//!
//! Drivers deliver events from their own execution context (system event
//! loop task, interrupt-adjacent callback, helper thread). The transition
//! function here has no side effects, so every ordering of events can be
//! checked without a radio.

use crate::config::SecurityMode;

use super::state::LinkSnapshot;

/// Driver status code meaning success. Anything else is a failure reason.
pub const STATUS_OK: i32 = 0;

/// One access point reported by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Network SSID.
    pub ssid: String,
    /// Radio channel.
    pub channel: u8,
    /// Signal strength in dBm.
    pub rssi: i8,
    /// Advertised security.
    pub security: SecurityMode,
}

/// Asynchronous link management event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// An access point was found during a scan.
    ScanResult(ScanEntry),
    /// A scan cycle finished.
    ScanDone { status: i32 },
    /// A connect request completed.
    ConnectResult { status: i32 },
    /// A disconnect completed, or the link dropped on its own.
    DisconnectResult { status: i32 },
}

/// Receiver of link management events, one method per event kind.
///
/// Implementations must not block: drivers call these from their event
/// dispatch context.
pub trait LinkEventListener: Send + Sync {
    /// An access point was found.
    fn on_scan_result(&self, entry: &ScanEntry);
    /// A scan cycle finished.
    fn on_scan_done(&self, status: i32);
    /// A connect request completed.
    fn on_connect_result(&self, status: i32);
    /// A disconnect completed or the link dropped.
    fn on_disconnect_result(&self, status: i32);

    /// Route an event to the matching method.
    fn dispatch(&self, event: &LinkEvent) {
        match event {
            LinkEvent::ScanResult(entry) => self.on_scan_result(entry),
            LinkEvent::ScanDone { status } => self.on_scan_done(*status),
            LinkEvent::ConnectResult { status } => self.on_connect_result(*status),
            LinkEvent::DisconnectResult { status } => self.on_disconnect_result(*status),
        }
    }
}

/// What an event meant, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Scan row number `index` (1-based).
    ScanRow { index: u32 },
    /// Scan finished.
    ScanComplete,
    /// Scan request failed.
    ScanFailed(i32),
    /// Association succeeded.
    Connected,
    /// Association failed.
    ConnectFailed(i32),
    /// Requested disconnect finished.
    DisconnectDone,
    /// Requested disconnect failed.
    DisconnectFailed(i32),
    /// The link went down without being asked to.
    Dropped,
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Link state after the event.
    pub link: LinkSnapshot,
    /// Scan tally after the event.
    pub scan_tally: u32,
    /// What happened.
    pub notice: Notice,
}

/// Apply one event to the link state and scan tally.
pub fn transition(link: LinkSnapshot, scan_tally: u32, event: &LinkEvent) -> Transition {
    let mut next = link;
    let mut tally = scan_tally;

    let notice = match event {
        LinkEvent::ScanResult(_) => {
            tally = tally.saturating_add(1);
            Notice::ScanRow { index: tally }
        }
        LinkEvent::ScanDone { status } => {
            tally = 0;
            if *status == STATUS_OK {
                Notice::ScanComplete
            } else {
                Notice::ScanFailed(*status)
            }
        }
        LinkEvent::ConnectResult { status } => {
            next.connecting = false;
            if *status == STATUS_OK {
                next.connected = true;
                Notice::Connected
            } else {
                Notice::ConnectFailed(*status)
            }
        }
        LinkEvent::DisconnectResult { status } => {
            if link.disconnecting {
                next.disconnecting = false;
                if *status == STATUS_OK {
                    next.connected = false;
                    Notice::DisconnectDone
                } else {
                    Notice::DisconnectFailed(*status)
                }
            } else {
                next.connected = false;
                Notice::Dropped
            }
        }
    };

    Transition {
        link: next,
        scan_tally: tally,
        notice,
    }
}
