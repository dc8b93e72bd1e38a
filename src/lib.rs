//! CoAP connectivity probe for ESP32.
//!
//! Brings up a Wi-Fi station link under a bounded retry policy, performs a
//! single confirmable CoAP GET with a deadline, and reports the result
//! alongside an entropy quality battery. Everything except the ESP-IDF
//! driver and NVS storage builds and tests on the host.

pub mod config;
pub mod entropy;
pub mod exchange;
pub mod harness;
pub mod link;

// Re-export commonly used items
pub use config::{ConfigError, LinkCredentials, ProbeConfig};
pub use entropy::{EntropyBattery, EntropyError, EntropyPool, EntropySource};
pub use exchange::{ExchangeEngine, ExchangeError, ExchangeOutcome};
pub use harness::{Harness, TapReporter, Verdict};
pub use link::{LinkController, LinkDriver, LinkError, LinkEventBridge, RetryPolicy};
