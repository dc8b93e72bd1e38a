//! Link credential data structures.
//!
//! Platform-independent types describing how the device associates with an
//! access point. They can be tested on the host machine.
//!
//! # Example
//!
//! ```
//! use coap_probe_esp32::config::{Channel, LinkCredentials, SecurityMode};
//!
//! let creds = LinkCredentials::new("MyNetwork", "MyPassword").unwrap();
//! assert_eq!(creds.security, SecurityMode::Psk);
//! assert_eq!(creds.channel, Channel::Any);
//! ```

use std::fmt;
use std::time::Duration;
use zeroize::Zeroizing;

use super::ConfigError;

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum pre-shared key length for WPA2.
pub const MAX_PSK_LEN: usize = 64;

/// Minimum pre-shared key length for WPA2.
pub const MIN_PSK_LEN: usize = 8;

/// Highest 2.4 GHz channel number.
pub const MAX_CHANNEL: u8 = 14;

/// Radio channel selection for the association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channel {
    /// Let the driver scan all channels.
    #[default]
    Any,
    /// Restrict the association to one channel.
    Specific(u8),
}

impl std::str::FromStr for Channel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("any") || s.is_empty() {
            return Ok(Self::Any);
        }
        let channel: u8 = s.parse().map_err(|_| ConfigError::InvalidValue {
            key: "channel",
            value: s.to_string(),
        })?;
        if channel == 0 || channel > MAX_CHANNEL {
            return Err(ConfigError::InvalidChannel(channel));
        }
        Ok(Self::Specific(channel))
    }
}

/// Link-layer security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// No authentication.
    Open,
    /// WPA/WPA2 personal (pre-shared key).
    Psk,
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "Open"),
            Self::Psk => write!(f, "WPA/WPA2"),
        }
    }
}

/// Management-frame protection preference (802.11w).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MfpPreference {
    /// Never negotiate protected management frames.
    Disabled,
    /// Use protected management frames when the AP supports them.
    #[default]
    Optional,
    /// Refuse APs that do not support protected management frames.
    Required,
}

/// Credentials for associating with an access point.
///
/// Immutable once the probe starts. The pre-shared key is wiped from memory
/// when the value is dropped and never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkCredentials {
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    psk: Zeroizing<String>,
    /// Channel selector.
    pub channel: Channel,
    /// Security mode.
    pub security: SecurityMode,
    /// Management-frame protection preference.
    pub mfp: MfpPreference,
    /// Driver-side association timeout. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl LinkCredentials {
    /// Create credentials for a PSK-protected network.
    ///
    /// Returns an error if SSID or key are invalid.
    pub fn new(ssid: impl Into<String>, psk: impl Into<String>) -> Result<Self, ConfigError> {
        let creds = Self {
            ssid: ssid.into(),
            psk: Zeroizing::new(psk.into()),
            channel: Channel::Any,
            security: SecurityMode::Psk,
            mfp: MfpPreference::Optional,
            timeout: None,
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Create credentials for an open network (no key).
    pub fn open(ssid: impl Into<String>) -> Result<Self, ConfigError> {
        let creds = Self {
            ssid: ssid.into(),
            psk: Zeroizing::new(String::new()),
            channel: Channel::Any,
            security: SecurityMode::Open,
            mfp: MfpPreference::Optional,
            timeout: None,
        };
        creds.validate()?;
        Ok(creds)
    }

    /// Restrict the association to a channel.
    pub fn with_channel(mut self, channel: Channel) -> Result<Self, ConfigError> {
        self.channel = channel;
        self.validate()?;
        Ok(self)
    }

    /// Set the management-frame protection preference.
    pub fn with_mfp(mut self, mfp: MfpPreference) -> Self {
        self.mfp = mfp;
        self
    }

    /// Set the driver-side association timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The pre-shared key (empty for open networks).
    pub fn psk(&self) -> &str {
        &self.psk
    }

    /// Validate the credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }

        match self.security {
            SecurityMode::Open => {
                if !self.psk.is_empty() {
                    return Err(ConfigError::UnexpectedPsk);
                }
            }
            SecurityMode::Psk => {
                if self.psk.len() < MIN_PSK_LEN {
                    return Err(ConfigError::PskTooShort {
                        len: self.psk.len(),
                        min: MIN_PSK_LEN,
                    });
                }
                if self.psk.len() > MAX_PSK_LEN {
                    return Err(ConfigError::PskTooLong {
                        len: self.psk.len(),
                        max: MAX_PSK_LEN,
                    });
                }
            }
        }

        if let Channel::Specific(channel) = self.channel {
            if channel == 0 || channel > MAX_CHANNEL {
                return Err(ConfigError::InvalidChannel(channel));
            }
        }

        Ok(())
    }

    /// Check if this is an open network (no key).
    pub fn is_open(&self) -> bool {
        self.security == SecurityMode::Open
    }

    /// Serialize SSID and key for NVS storage.
    ///
    /// Format: `[ssid_len:1][ssid:N][psk_len:1][psk:M]`
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = Vec::with_capacity(2 + self.ssid.len() + self.psk.len());
        bytes.push(self.ssid.len() as u8);
        bytes.extend_from_slice(self.ssid.as_bytes());
        bytes.push(self.psk.len() as u8);
        bytes.extend_from_slice(self.psk.as_bytes());
        Zeroizing::new(bytes)
    }

    /// Deserialize from bytes. An empty key yields open-network credentials.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let (&ssid_len, rest) = bytes
            .split_first()
            .ok_or_else(|| ConfigError::InvalidFormat("empty data".into()))?;
        let ssid_len = ssid_len as usize;
        if rest.len() < ssid_len + 1 {
            return Err(ConfigError::InvalidFormat("truncated SSID".into()));
        }

        let ssid = std::str::from_utf8(&rest[..ssid_len])
            .map_err(|_| ConfigError::InvalidFormat("invalid SSID UTF-8".into()))?;

        let psk_len = rest[ssid_len] as usize;
        let psk_bytes = &rest[ssid_len + 1..];
        if psk_bytes.len() < psk_len {
            return Err(ConfigError::InvalidFormat("truncated key".into()));
        }

        let psk = std::str::from_utf8(&psk_bytes[..psk_len])
            .map_err(|_| ConfigError::InvalidFormat("invalid key UTF-8".into()))?;

        if psk.is_empty() {
            Self::open(ssid)
        } else {
            Self::new(ssid, psk)
        }
    }
}

impl fmt::Debug for LinkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkCredentials")
            .field("ssid", &self.ssid)
            .field("psk", &"<redacted>")
            .field("channel", &self.channel)
            .field("security", &self.security)
            .field("mfp", &self.mfp)
            .field("timeout", &self.timeout)
            .finish()
    }
}
