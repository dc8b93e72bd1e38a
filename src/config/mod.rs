//! Probe configuration management.
//!
//! # Components
//!
//! - [`link`] - link credentials (host-testable)
//! - [`probe`] - complete run configuration from environment or build-time values

mod link;
mod probe;

use std::fmt;

pub use link::{
    Channel, LinkCredentials, MfpPreference, SecurityMode, MAX_CHANNEL, MAX_PSK_LEN, MAX_SSID_LEN,
    MIN_PSK_LEN,
};
pub use probe::{
    ProbeConfig, DEFAULT_COAP_URI, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EXCHANGE_DEADLINE,
    DEFAULT_POLL_INTERVAL, DEFAULT_PUMP_SLICE, DEFAULT_SETTLE_DELAY, KEY_BACKOFF_MS, KEY_CHANNEL,
    KEY_DEADLINE_MS, KEY_PSK, KEY_RETRIES, KEY_SSID, KEY_URI, UNSET_PSK, UNSET_SSID,
};

/// Errors that can occur during configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Key is too short for WPA2.
    PskTooShort { len: usize, min: usize },
    /// Key exceeds maximum length.
    PskTooLong { len: usize, max: usize },
    /// A key was supplied for an open network.
    UnexpectedPsk,
    /// Channel outside 1-14.
    InvalidChannel(u8),
    /// Invalid data format during deserialization.
    InvalidFormat(String),
    /// A configuration value could not be parsed.
    InvalidValue { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PskTooShort { len, min } => {
                write!(f, "key too short: {} bytes (min {})", len, min)
            }
            Self::PskTooLong { len, max } => {
                write!(f, "key too long: {} bytes (max {})", len, max)
            }
            Self::UnexpectedPsk => write!(f, "open networks take no key"),
            Self::InvalidChannel(ch) => write!(f, "invalid channel: {}", ch),
            Self::InvalidFormat(msg) => write!(f, "invalid format: {}", msg),
            Self::InvalidValue { key, value } => write!(f, "invalid value for {}: {:?}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}
