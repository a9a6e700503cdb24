//! Host-side client for a ranging device
//!
//! The device sits on a serial port and answers a one-byte measure command
//! with a propagation delay. It can also join a Wi-Fi network, after which
//! the same exchange runs over UDP.
//!
//! # Architecture
//!
//! The crate is layered bottom-up:
//!
//! 1. **Framing** - raw float frames (serial) and decimal text (UDP)
//! 2. **Transports** - [`SerialTransport`] and [`WirelessTransport`]
//!    behind the [`Transport`] trait
//! 3. **Wi-Fi** - scanning and profile activation behind [`WifiFacility`]
//! 4. **Session** - [`DeviceSession`] owns one transport and switches from
//!    serial to wireless exactly once
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ruler_link::{DeviceSession, SessionConfigBuilder, WirelessCredentials};
//!
//! #[tokio::main]
//! async fn main() -> ruler_link::Result<()> {
//!     let config = SessionConfigBuilder::new()
//!         .serial_port("/dev/ttyUSB0")
//!         .wifi_interface("wlan0")
//!         .build();
//!
//!     let mut session = DeviceSession::open(config).await?;
//!     println!("delay: {}", session.measure().await?);
//!
//!     for ssid in session.discover_networks().await? {
//!         println!("visible: {ssid}");
//!     }
//!
//!     let creds = WirelessCredentials::new("lab", "s3cret");
//!     let _serial = session.go_wireless("192.168.4.1", 5005, &creds).await?;
//!     println!("delay: {}", session.measure().await?);
//!
//!     session.close().await
//! }
//! ```
//!
//! # Features
//!
//! - `serial` (default) - open real serial ports via `tokio-serial`
//! - `udev` - [`available_ports`] enumerates through libudev (requires
//!   `libudev-dev` on Linux)
//!
//! # Protocol Details
//!
//! Serial: the host writes `m`; the device answers with up to 16 bytes whose
//! last four are an `f32` in native byte order. Shorter replies are
//! zero-padded on the left.
//!
//! UDP: the host sends the datagram `m`; the device answers with the delay
//! as ASCII decimal text.
//!
//! The library logs through `tracing` and never installs a subscriber.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod framing;
pub mod transport;
pub mod wifi;

pub mod session;

pub mod test_utils;

pub use config::{SerialConfig, SessionConfig, SessionConfigBuilder, WirelessConfig};
pub use error::{LinkError, Result};
pub use framing::{Delay, FramePolicy};
pub use transport::{SerialTransport, Transport, TransportState, WirelessTransport};
pub use wifi::{
    CellKey, NetworkCatalog, NetworkCell, NetworkDiscovery, NmcliFacility, WifiFacility,
    WirelessCredentials, WirelessProvisioner,
};

pub use session::{DeviceSession, Mode};

#[cfg(feature = "serial")]
pub use session::SerialDeviceSession;
#[cfg(feature = "serial")]
pub use transport::available_ports;

pub use test_utils::{MockWifiFacility, SerialDeviceStub, UdpDeviceStub};

// Protocol constants re-exports
pub use config::{
    DEFAULT_BAUD_RATE, DEFAULT_PROFILE_NAME, DEFAULT_TIMEOUT_MS, DEFAULT_WIFI_INTERFACE,
};
pub use framing::{FLOAT_WIDTH, MAX_DATAGRAM_LEN, MAX_SERIAL_FRAME, MEASURE_COMMAND};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
