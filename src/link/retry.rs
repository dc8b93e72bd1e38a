//! Bounded connection-establishment policy.
//!
//! Every failure is treated the same way: missing interface, refused
//! request and timeout all lead to a disconnect, a fixed backoff and another
//! attempt, until the attempt budget runs out.

use std::thread;
use std::time::Duration;

use log::{info, warn};

use super::controller::LinkController;
use super::{LinkDriver, LinkError};
use crate::config::LinkCredentials;

/// Retry policy for bringing the link up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause after a failed attempt before the next one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Connect and wait for the link, retrying on any failure.
    ///
    /// Returns the number of the attempt that succeeded, or the error of the
    /// last attempt once the budget is spent. Each failed attempt is followed
    /// by exactly one disconnect request.
    pub fn establish<D: LinkDriver>(
        &self,
        controller: &mut LinkController<D>,
        credentials: &LinkCredentials,
        connect_timeout: Duration,
    ) -> Result<u32, LinkError> {
        let mut last_error = LinkError::Timeout;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                info!("Wi-Fi retry {}/{}", attempt, self.max_attempts);
            }

            let result = controller
                .request_connect(credentials)
                .and_then(|()| controller.await_connected(connect_timeout));

            match result {
                Ok(()) => return Ok(attempt),
                Err(e) => {
                    warn!("Wi-Fi attempt {} failed: {}", attempt, e);
                    controller.request_disconnect();
                    last_error = e;
                    if attempt < self.max_attempts {
                        thread::sleep(self.backoff);
                    }
                }
            }
        }

        Err(last_error)
    }
}
