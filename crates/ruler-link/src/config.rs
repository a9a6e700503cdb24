//! Configuration types for a device session
//!
//! Serial port settings, the serial frame policy and the Wi-Fi/UDP settings
//! used once the session switches to wireless mode.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LinkError, Result};
use crate::framing::{FramePolicy, MAX_DATAGRAM_LEN};

/// Default baud rate for the ranging device
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default per-call read timeout on either transport
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default wireless interface used for scanning and joining
pub const DEFAULT_WIFI_INTERFACE: &str = "wlan0";

/// Default name of the connection profile created when joining a network
pub const DEFAULT_PROFILE_NAME: &str = "ruler";

/// Main configuration for a device session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialConfig,

    /// Wi-Fi and UDP link settings
    #[serde(default)]
    pub wireless: WirelessConfig,
}

impl SessionConfig {
    /// Check the configuration for values no transport can work with
    pub fn validate(&self) -> Result<()> {
        if self.serial.read_timeout.is_zero() {
            return Err(LinkError::InvalidConfig(
                "serial read_timeout must be non-zero".to_string(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(LinkError::InvalidConfig(
                "serial baud_rate must be non-zero".to_string(),
            ));
        }
        if self.wireless.reply_timeout.is_zero() {
            return Err(LinkError::InvalidConfig(
                "wireless reply_timeout must be non-zero".to_string(),
            ));
        }
        if self.wireless.max_datagram == 0 {
            return Err(LinkError::InvalidConfig(
                "wireless max_datagram must be non-zero".to_string(),
            ));
        }
        if self.wireless.interface.is_empty() {
            return Err(LinkError::InvalidConfig(
                "wireless interface name is empty".to_string(),
            ));
        }
        if self.wireless.profile_name.is_empty() {
            return Err(LinkError::InvalidConfig(
                "wireless profile_name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serial link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Path to serial port (e.g., /dev/ttyUSB0, COM3)
    #[serde(default = "default_port")]
    pub port: PathBuf,

    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Upper bound on a single measurement read
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub read_timeout: Duration,

    /// How responses longer than one float are handled
    #[serde(default)]
    pub frame_policy: FramePolicy,
}

fn default_port() -> PathBuf {
    PathBuf::from("/dev/ttyUSB0")
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout() -> Duration {
    Duration::from_millis(DEFAULT_TIMEOUT_MS)
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: default_timeout(),
            frame_policy: FramePolicy::default(),
        }
    }
}

/// Wi-Fi and UDP link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirelessConfig {
    /// Wireless interface used for scanning and joining
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Name of the connection profile created on join
    #[serde(default = "default_profile_name")]
    pub profile_name: String,

    /// Upper bound on waiting for the reply datagram
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub reply_timeout: Duration,

    /// Receive buffer size for the reply datagram
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,
}

fn default_interface() -> String {
    DEFAULT_WIFI_INTERFACE.to_string()
}

fn default_profile_name() -> String {
    DEFAULT_PROFILE_NAME.to_string()
}

fn default_max_datagram() -> usize {
    MAX_DATAGRAM_LEN
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            profile_name: default_profile_name(),
            reply_timeout: default_timeout(),
            max_datagram: MAX_DATAGRAM_LEN,
        }
    }
}

/// Builder for SessionConfig
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set serial port path
    pub fn serial_port(mut self, port: impl Into<PathBuf>) -> Self {
        self.config.serial.port = port.into();
        self
    }

    /// Set serial baud rate
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.serial.baud_rate = baud_rate;
        self
    }

    /// Set the serial read timeout
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.serial.read_timeout = timeout;
        self
    }

    /// Set the serial frame policy
    pub fn frame_policy(mut self, policy: FramePolicy) -> Self {
        self.config.serial.frame_policy = policy;
        self
    }

    /// Set the wireless interface name
    pub fn wifi_interface(mut self, interface: impl Into<String>) -> Self {
        self.config.wireless.interface = interface.into();
        self
    }

    /// Set the connection profile name
    pub fn profile_name(mut self, name: impl Into<String>) -> Self {
        self.config.wireless.profile_name = name.into();
        self
    }

    /// Set the UDP reply timeout
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.wireless.reply_timeout = timeout;
        self
    }

    /// Set the UDP receive buffer size
    pub fn max_datagram(mut self, size: usize) -> Self {
        self.config.wireless.max_datagram = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
