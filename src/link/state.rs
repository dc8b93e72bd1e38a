//! Shared link state cell.
//!
//! Written by the event bridge from the driver's dispatch context and read
//! by the controller's polling loop. Every write wakes waiters, so a poller
//! sees a transition as soon as it happens rather than at the next tick.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Point-in-time copy of the link flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkSnapshot {
    /// A connect request was submitted and has not completed.
    pub connecting: bool,
    /// A disconnect request was submitted and has not completed.
    pub disconnecting: bool,
    /// The link is associated.
    pub connected: bool,
}

/// Thread-safe link state shared between the bridge and the controller.
#[derive(Debug, Default)]
pub struct LinkState {
    snapshot: Mutex<LinkSnapshot>,
    changed: Condvar,
}

impl LinkState {
    /// Create a state cell with all flags cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current flags.
    pub fn snapshot(&self) -> LinkSnapshot {
        *self.lock()
    }

    /// Mutate the flags and wake every waiter.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut LinkSnapshot) -> R) -> R {
        let result = f(&mut self.lock());
        self.changed.notify_all();
        result
    }

    /// Block until `done` holds or `timeout` elapses. Returns the flags seen last.
    pub fn wait_until<F>(&self, timeout: Duration, mut done: F) -> LinkSnapshot
    where
        F: FnMut(&LinkSnapshot) -> bool,
    {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |snapshot| !done(snapshot))
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn lock(&self) -> MutexGuard<'_, LinkSnapshot> {
        // A panicking writer cannot leave the flags half-written.
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
