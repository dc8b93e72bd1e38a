//! Scripted driver for link tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::event::{LinkEventListener, ScanEntry};
use super::{DriverError, InterfaceId, LinkDriver};
use crate::config::{LinkCredentials, SecurityMode};

/// What the driver does with a connect request.
#[derive(Debug, Clone)]
pub(crate) enum ConnectBehavior {
    /// Accept the request and never report back.
    Silent,
    /// Report `ConnectResult(status)` before returning.
    Immediate(i32),
    /// Report `ConnectResult(status)` from another thread after a delay.
    After(Duration, i32),
    /// Refuse the request.
    Reject(DriverError),
}

/// Driver call, in order of arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Connect,
    Disconnect,
    Scan,
}

pub(crate) struct ScriptedDriver {
    interface: bool,
    default_connect: ConnectBehavior,
    script: VecDeque<ConnectBehavior>,
    scan_results: u32,
    answer_disconnect: bool,
    listener: Option<Arc<dyn LinkEventListener>>,
    subscriptions: usize,
    calls: Arc<Mutex<Vec<Call>>>,
    events_sent: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl ScriptedDriver {
    pub(crate) fn new() -> Self {
        Self {
            interface: true,
            default_connect: ConnectBehavior::Silent,
            script: VecDeque::new(),
            scan_results: 0,
            answer_disconnect: true,
            listener: None,
            subscriptions: 0,
            calls: Arc::new(Mutex::new(Vec::new())),
            events_sent: Arc::new(AtomicUsize::new(0)),
            workers: Vec::new(),
        }
    }

    pub(crate) fn without_interface(mut self) -> Self {
        self.interface = false;
        self
    }

    pub(crate) fn connect(mut self, behavior: ConnectBehavior) -> Self {
        self.default_connect = behavior;
        self
    }

    /// Behaviors for the first connect requests; later ones use the default.
    pub(crate) fn connect_sequence(mut self, behaviors: Vec<ConnectBehavior>) -> Self {
        self.script = behaviors.into();
        self
    }

    /// Accept disconnect requests without ever reporting the result.
    pub(crate) fn silent_disconnect(mut self) -> Self {
        self.answer_disconnect = false;
        self
    }

    pub(crate) fn scan_results(mut self, count: u32) -> Self {
        self.scan_results = count;
        self
    }

    pub(crate) fn subscriptions(&self) -> usize {
        self.subscriptions
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn connect_requests(&self) -> usize {
        self.count(Call::Connect)
    }

    pub(crate) fn disconnect_requests(&self) -> usize {
        self.count(Call::Disconnect)
    }

    pub(crate) fn scan_requests(&self) -> usize {
        self.count(Call::Scan)
    }

    pub(crate) fn events_sent(&self) -> usize {
        self.events_sent.load(Ordering::SeqCst)
    }

    fn count(&self, call: Call) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn emit(&self, f: impl FnOnce(&dyn LinkEventListener)) {
        if let Some(listener) = &self.listener {
            f(listener.as_ref());
            self.events_sent.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl LinkDriver for ScriptedDriver {
    fn default_interface(&self) -> Option<InterfaceId> {
        self.interface.then(|| InterfaceId::new("wlan0"))
    }

    fn subscribe(&mut self, listener: Arc<dyn LinkEventListener>) {
        self.listener = Some(listener);
        self.subscriptions += 1;
    }

    fn submit_connect(
        &mut self,
        _iface: &InterfaceId,
        _credentials: &LinkCredentials,
    ) -> Result<(), DriverError> {
        self.record(Call::Connect);
        let behavior = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.default_connect.clone());
        match behavior {
            ConnectBehavior::Silent => Ok(()),
            ConnectBehavior::Immediate(status) => {
                self.emit(|l| l.on_connect_result(status));
                Ok(())
            }
            ConnectBehavior::After(delay, status) => {
                if let Some(listener) = self.listener.clone() {
                    let sent = self.events_sent.clone();
                    self.workers.push(thread::spawn(move || {
                        thread::sleep(delay);
                        listener.on_connect_result(status);
                        sent.fetch_add(1, Ordering::SeqCst);
                    }));
                }
                Ok(())
            }
            ConnectBehavior::Reject(e) => Err(e),
        }
    }

    fn submit_disconnect(&mut self, _iface: &InterfaceId) -> Result<(), DriverError> {
        self.record(Call::Disconnect);
        if self.answer_disconnect {
            self.emit(|l| l.on_disconnect_result(0));
        }
        Ok(())
    }

    fn submit_scan(&mut self, _iface: &InterfaceId) -> Result<(), DriverError> {
        self.record(Call::Scan);
        for i in 0..self.scan_results {
            let entry = ScanEntry {
                ssid: format!("ap-{}", i),
                channel: 1 + (i % 11) as u8,
                rssi: -40 - i as i8,
                security: SecurityMode::Psk,
            };
            self.emit(|l| l.on_scan_result(&entry));
        }
        self.emit(|l| l.on_scan_done(0));
        Ok(())
    }
}

impl Drop for ScriptedDriver {
    fn drop(&mut self) {
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
