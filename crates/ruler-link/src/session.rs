//! Device session: one device, one active transport
//!
//! A session starts on the serial link. [`DeviceSession::go_wireless`]
//! joins a Wi-Fi network and moves the session to UDP for the rest of its
//! life; there is no way back. [`DeviceSession::measure`] works the same in
//! both modes.
//!
//! ```rust,ignore
//! use ruler_link::{DeviceSession, SessionConfigBuilder, WirelessCredentials};
//!
//! #[tokio::main]
//! async fn main() -> ruler_link::Result<()> {
//!     let config = SessionConfigBuilder::new().serial_port("/dev/ttyUSB0").build();
//!     let mut session = DeviceSession::open(config).await?;
//!
//!     println!("serial delay: {}", session.measure().await?);
//!
//!     let networks = session.discover_networks().await?;
//!     let creds = WirelessCredentials::new(networks[0].clone(), "passkey");
//!     let mut serial = session.go_wireless("192.168.4.1", 5005, &creds).await?;
//!     serial.close().await?;
//!
//!     println!("wireless delay: {}", session.measure().await?);
//!     session.close().await
//! }
//! ```

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{LinkError, Result};
use crate::framing::{Delay, MEASURE_COMMAND};
use crate::transport::{SerialTransport, Transport, WirelessTransport};
use crate::wifi::{
    NetworkCatalog, NetworkDiscovery, WifiFacility, WirelessCredentials, WirelessProvisioner,
};

#[cfg(feature = "serial")]
use crate::wifi::NmcliFacility;
#[cfg(feature = "serial")]
use tokio_serial::SerialStream;

/// Session over a real serial port
#[cfg(feature = "serial")]
pub type SerialDeviceSession = DeviceSession<SerialStream>;

/// Link a session is measuring over
///
/// Ordered: a session only ever moves from a lower mode to a higher one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    /// Serial link (initial)
    Serial = 0,
    /// UDP over Wi-Fi (terminal)
    Wireless = 1,
}

impl Mode {
    /// Check if a session in this mode may move to `next`
    pub fn can_advance_to(self, next: Mode) -> bool {
        next > self
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Serial => write!(f, "serial"),
            Mode::Wireless => write!(f, "wireless"),
        }
    }
}

/// The one transport a session holds
enum ActiveTransport<P> {
    Serial(SerialTransport<P>),
    Wireless(WirelessTransport),
}

impl<P> ActiveTransport<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn mode(&self) -> Mode {
        match self {
            ActiveTransport::Serial(_) => Mode::Serial,
            ActiveTransport::Wireless(_) => Mode::Wireless,
        }
    }

    fn as_transport(&self) -> &dyn Transport {
        match self {
            ActiveTransport::Serial(t) => t,
            ActiveTransport::Wireless(t) => t,
        }
    }

    fn as_transport_mut(&mut self) -> &mut dyn Transport {
        match self {
            ActiveTransport::Serial(t) => t,
            ActiveTransport::Wireless(t) => t,
        }
    }
}

/// Client session for one ranging device
///
/// Every mutating operation takes `&mut self`, so at most one measurement
/// or mode switch is in flight per session. Share a session between tasks
/// behind a `tokio::sync::Mutex`.
pub struct DeviceSession<P> {
    config: SessionConfig,
    discovery: NetworkDiscovery,
    provisioner: WirelessProvisioner,
    active: ActiveTransport<P>,
}

#[cfg(feature = "serial")]
impl DeviceSession<SerialStream> {
    /// Open the serial port in `config`, using NetworkManager for Wi-Fi
    pub async fn open(config: SessionConfig) -> Result<Self> {
        Self::open_with_facility(config, Arc::new(NmcliFacility::new())).await
    }

    /// Open the serial port in `config` with a custom Wi-Fi facility
    ///
    /// Fails if the port cannot be opened; no retry is attempted.
    pub async fn open_with_facility(
        config: SessionConfig,
        facility: Arc<dyn WifiFacility>,
    ) -> Result<Self> {
        config.validate()?;
        let serial = SerialTransport::open(&config.serial).await?;
        Ok(Self::with_transport(serial, config, facility))
    }
}

impl<P> DeviceSession<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a session around an already open serial transport
    pub fn with_transport(
        serial: SerialTransport<P>,
        config: SessionConfig,
        facility: Arc<dyn WifiFacility>,
    ) -> Self {
        let discovery = NetworkDiscovery::new(facility.clone(), &config.wireless.interface);
        let provisioner = WirelessProvisioner::from_config(facility, &config.wireless);

        info!(transport = serial.name(), "Device session started");
        Self {
            config,
            discovery,
            provisioner,
            active: ActiveTransport::Serial(serial),
        }
    }

    /// Get the current mode
    pub fn mode(&self) -> Mode {
        self.active.mode()
    }

    /// Get the session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the active transport's name
    pub fn transport_name(&self) -> &str {
        self.active.as_transport().name()
    }

    /// Check if the active transport is still open
    pub fn is_open(&self) -> bool {
        self.active.as_transport().is_open()
    }

    /// Take one measurement over the active transport
    ///
    /// One command, one reply, no retries. Timeouts and decode failures are
    /// returned as they happened.
    pub async fn measure(&mut self) -> Result<Delay> {
        let mode = self.mode();
        let transport = self.active.as_transport_mut();

        transport.send_command(MEASURE_COMMAND).await?;
        let delay = transport.read_measurement().await.map_err(|e| {
            warn!(%mode, code = e.error_code(), error = %e, "Measurement failed");
            e
        })?;

        debug!(%mode, %delay, "Measurement complete");
        Ok(delay)
    }

    /// Scan for networks and return their SSIDs, best signal first
    pub async fn discover_networks(&self) -> Result<Vec<String>> {
        Ok(self.discover_catalog().await?.ssids())
    }

    /// Scan for networks and return the ranked, deduplicated catalog
    pub async fn discover_catalog(&self) -> Result<NetworkCatalog> {
        self.discovery.discover().await
    }

    /// Join `credentials.ssid` and switch to UDP towards `(host, port)`
    ///
    /// On success the retired serial transport is handed back still open;
    /// close or drop it as needed. On failure the session stays in serial
    /// mode. This is a one-shot transition: a wireless session answers
    /// [`LinkError::AlreadyWireless`].
    pub async fn go_wireless(
        &mut self,
        host: &str,
        port: u16,
        credentials: &WirelessCredentials,
    ) -> Result<SerialTransport<P>> {
        if !self.mode().can_advance_to(Mode::Wireless) {
            return Err(LinkError::AlreadyWireless);
        }

        self.provisioner.provision(credentials).await?;
        let wireless = WirelessTransport::connect(host, port, &self.config.wireless).await?;

        match std::mem::replace(&mut self.active, ActiveTransport::Wireless(wireless)) {
            ActiveTransport::Serial(serial) => {
                info!(
                    ssid = %credentials.ssid,
                    remote = self.transport_name(),
                    "Session switched to wireless"
                );
                Ok(serial)
            }
            ActiveTransport::Wireless(_) => Err(LinkError::AlreadyWireless),
        }
    }

    /// Close the active transport
    ///
    /// Safe to call more than once and after failed operations.
    pub async fn close(&mut self) -> Result<()> {
        let mode = self.mode();
        self.active.as_transport_mut().close().await?;
        debug!(%mode, "Device session closed");
        Ok(())
    }
}

impl<P> std::fmt::Debug for DeviceSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (mode, transport): (Mode, &dyn std::fmt::Debug) = match &self.active {
            ActiveTransport::Serial(t) => (Mode::Serial, t),
            ActiveTransport::Wireless(t) => (Mode::Wireless, t),
        };
        f.debug_struct("DeviceSession")
            .field("mode", &mode)
            .field("transport", transport)
            .field("discovery", &self.discovery)
            .finish()
    }
}
