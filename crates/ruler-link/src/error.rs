//! Error types for ruler-link operations
//!
//! One enum covers the serial link, the UDP link, the wire codecs and the
//! Wi-Fi facility. The variants stay distinct so callers can tell a timeout
//! from a garbled reply, and [`LinkError::is_device_connection_error`]
//! folds them back into a single "device connection" kind for callers that
//! only care whether the round trip worked.

use thiserror::Error;

/// Main error type for ruler-link operations
#[derive(Error, Debug)]
pub enum LinkError {
    // ===== Serial/Transport Errors =====
    /// Serial port not found
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// Serial port open failed
    #[error("Failed to open serial port {port}: {reason}")]
    PortOpenFailed {
        /// Port path
        port: String,
        /// Failure reason
        reason: String,
    },

    /// Serial read error
    #[error("Serial read error: {0}")]
    ReadError(String),

    /// Serial write error
    #[error("Serial write error: {0}")]
    WriteError(String),

    /// Device closed the stream
    #[error("Device disconnected")]
    Disconnected,

    /// No reply within the read timeout
    #[error("No reply from device within {duration_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// UDP socket failure
    #[error("Socket error: {0}")]
    Socket(String),

    /// Operation attempted on a transport that was already closed
    #[error("Transport {0} is closed")]
    TransportClosed(String),

    // ===== Framing Errors =====
    /// Serial response longer than the protocol allows
    #[error("Frame too long: {len} bytes exceeds maximum of {max} bytes")]
    FrameTooLong {
        /// Received length
        len: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Serial response carries more than one float's worth of bytes
    #[error("Ambiguous frame: {len} bytes received, expected at most 4")]
    AmbiguousFrame {
        /// Received length
        len: usize,
    },

    /// Datagram reply that is not a decimal number
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    // ===== Wi-Fi Errors =====
    /// Scanning for access points failed
    #[error("Wi-Fi scan on {interface} failed: {reason}")]
    ScanFailed {
        /// Wireless interface name
        interface: String,
        /// Failure reason
        reason: String,
    },

    /// Creating or activating the connection profile failed
    #[error("Failed to join {ssid}: {reason}")]
    ProvisioningFailed {
        /// Network that was being joined
        ssid: String,
        /// Failure reason
        reason: String,
    },

    // ===== Session Errors =====
    /// Session already switched to the wireless link
    #[error("Session is already in wireless mode")]
    AlreadyWireless,

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Check if this error means the round trip with the device failed
    pub fn is_device_connection_error(&self) -> bool {
        matches!(
            self,
            LinkError::PortNotFound(_)
                | LinkError::PortOpenFailed { .. }
                | LinkError::ReadError(_)
                | LinkError::WriteError(_)
                | LinkError::Disconnected
                | LinkError::Timeout { .. }
                | LinkError::Socket(_)
                | LinkError::TransportClosed(_)
                | LinkError::MalformedPayload(_)
                | LinkError::Io(_)
        )
    }

    /// Check if the serial frame could not be interpreted
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            LinkError::FrameTooLong { .. } | LinkError::AmbiguousFrame { .. }
        )
    }

    /// Attach the port name to a serial open failure
    ///
    /// Driver errors carry their own description where the port should be;
    /// other variants are returned unchanged.
    pub fn for_port(self, port: &str) -> Self {
        match self {
            LinkError::PortNotFound(_) => LinkError::PortNotFound(port.to_owned()),
            LinkError::PortOpenFailed { reason, .. } => LinkError::PortOpenFailed {
                port: port.to_owned(),
                reason,
            },
            other => other,
        }
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            LinkError::PortNotFound(_) => "PORT_NOT_FOUND",
            LinkError::PortOpenFailed { .. } => "PORT_OPEN_FAILED",
            LinkError::ReadError(_) => "READ_ERROR",
            LinkError::WriteError(_) => "WRITE_ERROR",
            LinkError::Disconnected => "DISCONNECTED",
            LinkError::Timeout { .. } => "TIMEOUT",
            LinkError::Socket(_) => "SOCKET_ERROR",
            LinkError::TransportClosed(_) => "TRANSPORT_CLOSED",
            LinkError::FrameTooLong { .. } => "FRAME_TOO_LONG",
            LinkError::AmbiguousFrame { .. } => "AMBIGUOUS_FRAME",
            LinkError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            LinkError::ScanFailed { .. } => "SCAN_FAILED",
            LinkError::ProvisioningFailed { .. } => "PROVISIONING_FAILED",
            LinkError::AlreadyWireless => "ALREADY_WIRELESS",
            LinkError::InvalidConfig(_) => "INVALID_CONFIG",
            LinkError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for ruler-link operations
pub type Result<T> = std::result::Result<T, LinkError>;

// Conversion from serialport error (only when serial feature is enabled)
#[cfg(feature = "serial")]
impl From<serialport::Error> for LinkError {
    fn from(err: serialport::Error) -> Self {
        match err.kind {
            serialport::ErrorKind::NoDevice => LinkError::PortNotFound(err.description),
            serialport::ErrorKind::Io(kind) => {
                LinkError::Io(std::io::Error::new(kind, err.description))
            }
            _ => LinkError::PortOpenFailed {
                port: String::new(),
                reason: err.description,
            },
        }
    }
}
