//! Probe run configuration.
//!
//! Values come from a key/value source: the process environment on the host,
//! or values baked in at build time for the device (`option_env!`).

use std::time::Duration;

use super::link::{Channel, LinkCredentials};
use super::ConfigError;
use crate::link::RetryPolicy;

/// SSID key.
pub const KEY_SSID: &str = "PROBE_WIFI_SSID";
/// Pre-shared key. Empty selects an open network.
pub const KEY_PSK: &str = "PROBE_WIFI_PSK";
/// Channel (`any` or 1-14).
pub const KEY_CHANNEL: &str = "PROBE_WIFI_CHANNEL";
/// CoAP request URI.
pub const KEY_URI: &str = "PROBE_COAP_URI";
/// Exchange deadline in milliseconds.
pub const KEY_DEADLINE_MS: &str = "PROBE_DEADLINE_MS";
/// Link establishment attempts.
pub const KEY_RETRIES: &str = "PROBE_RETRIES";
/// Backoff between link attempts in milliseconds.
pub const KEY_BACKOFF_MS: &str = "PROBE_BACKOFF_MS";

/// Placeholder SSID used when none is configured.
pub const UNSET_SSID: &str = "WIFI_SSID_NOT_SET";

/// Placeholder key used when none is configured.
pub const UNSET_PSK: &str = "WIFI_PASS_NOT_SET";

/// Default exchange target.
pub const DEFAULT_COAP_URI: &str = "coap://134.102.218.18/hello";

/// Default exchange deadline.
pub const DEFAULT_EXCHANGE_DEADLINE: Duration = Duration::from_millis(5000);

/// Default I/O pump slice.
pub const DEFAULT_PUMP_SLICE: Duration = Duration::from_millis(500);

/// Default wait for the link to come up after a connect request.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default link state poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default settle delay between link establishment and the exchange.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Complete configuration for one probe run.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Link credentials.
    pub credentials: LinkCredentials,
    /// Request URI for the exchange.
    pub coap_uri: String,
    /// Total budget for the exchange.
    pub exchange_deadline: Duration,
    /// Upper bound for a single I/O pump call.
    pub pump_slice: Duration,
    /// Wait budget for one connect attempt.
    pub connect_timeout: Duration,
    /// Link state poll interval.
    pub poll_interval: Duration,
    /// Link establishment retry policy.
    pub retry: RetryPolicy,
    /// Pause after the link comes up, before the exchange.
    pub settle_delay: Duration,
}

impl ProbeConfig {
    /// Build a configuration from a key lookup, falling back to defaults for
    /// unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ssid = lookup(KEY_SSID).unwrap_or_else(|| UNSET_SSID.to_string());
        let psk = lookup(KEY_PSK).unwrap_or_else(|| UNSET_PSK.to_string());

        let credentials = if psk.is_empty() {
            LinkCredentials::open(ssid)?
        } else {
            LinkCredentials::new(ssid, psk)?
        };
        let credentials = match lookup(KEY_CHANNEL) {
            Some(raw) => credentials.with_channel(raw.parse::<Channel>()?)?,
            None => credentials,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, KEY_RETRIES, defaults.max_attempts)?,
            backoff: parse_millis_or(&lookup, KEY_BACKOFF_MS, defaults.backoff)?,
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: KEY_RETRIES,
                value: "0".to_string(),
            });
        }

        Ok(Self {
            credentials,
            coap_uri: lookup(KEY_URI).unwrap_or_else(|| DEFAULT_COAP_URI.to_string()),
            exchange_deadline: parse_millis_or(&lookup, KEY_DEADLINE_MS, DEFAULT_EXCHANGE_DEADLINE)?,
            pump_slice: DEFAULT_PUMP_SLICE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry,
            settle_delay: DEFAULT_SETTLE_DELAY,
        })
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration baked in at build time.
    pub fn compiled() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            let value = match key {
                KEY_SSID => option_env!("PROBE_WIFI_SSID"),
                KEY_PSK => option_env!("PROBE_WIFI_PSK"),
                KEY_CHANNEL => option_env!("PROBE_WIFI_CHANNEL"),
                KEY_URI => option_env!("PROBE_COAP_URI"),
                KEY_DEADLINE_MS => option_env!("PROBE_DEADLINE_MS"),
                KEY_RETRIES => option_env!("PROBE_RETRIES"),
                KEY_BACKOFF_MS => option_env!("PROBE_BACKOFF_MS"),
                _ => None,
            };
            value.map(str::to_string)
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

fn parse_millis_or<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_millis() as u64).map(Duration::from_millis)
}
