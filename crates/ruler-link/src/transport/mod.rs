//! Transports that carry the measurement exchange
//!
//! - [`SerialTransport`] - raw float frames over a serial byte stream
//! - [`WirelessTransport`] - decimal text over UDP, used after joining Wi-Fi
//!
//! # Feature Requirements
//!
//! Opening a real serial port by name needs the `serial` feature (on by
//! default). [`SerialTransport`] itself is generic over any async byte
//! stream and is always available.

mod serial;
mod wireless;

pub use serial::SerialTransport;
#[cfg(feature = "serial")]
pub use serial::available_ports;
pub use wireless::WirelessTransport;

use crate::error::Result;
use crate::framing::Delay;
use async_trait::async_trait;

/// Trait for the links a device session can measure over
///
/// A measurement is one [`send_command`](Transport::send_command) followed
/// by one [`read_measurement`](Transport::read_measurement).
#[async_trait]
pub trait Transport: Send {
    /// Send a single command byte to the device
    async fn send_command(&mut self, command: u8) -> Result<()>;

    /// Wait for and decode the device's reply
    async fn read_measurement(&mut self) -> Result<Delay>;

    /// Release the underlying handle
    ///
    /// Closing an already closed transport is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Check if the handle is still held
    fn is_open(&self) -> bool;

    /// Get the transport name (for logging)
    fn name(&self) -> &str;
}

/// Lifecycle state of a transport handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Handle held and usable
    Open,
    /// Handle released
    Closed,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Open => write!(f, "open"),
            TransportState::Closed => write!(f, "closed"),
        }
    }
}
