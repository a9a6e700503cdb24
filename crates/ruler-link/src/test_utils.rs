//! Test utilities for exercising sessions without hardware
//!
//! - [`MockWifiFacility`] - scripted scan results and provisioning outcomes
//! - [`UdpDeviceStub`] - loopback UDP responder standing in for the device
//! - [`SerialDeviceStub`] - in-memory serial responder for the same role
//! - [`serial_pair`] - a [`SerialTransport`] wired to an in-memory stream
//!
//! # Example
//!
//! ```rust,ignore
//! use ruler_link::test_utils::{serial_pair, MockWifiFacility, UdpDeviceStub};
//! use ruler_link::{DeviceSession, SessionConfig, WirelessCredentials};
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn switch_to_wireless() {
//!     let (transport, _device) = serial_pair(&SessionConfig::default());
//!     let wifi = MockWifiFacility::new();
//!     let mut session =
//!         DeviceSession::with_transport(transport, SessionConfig::default(), Arc::new(wifi));
//!
//!     let stub = UdpDeviceStub::replying(vec![b"1.25".to_vec()]).await.unwrap();
//!     session
//!         .go_wireless("127.0.0.1", stub.port(), &WirelessCredentials::new("lab", "pw"))
//!         .await
//!         .unwrap();
//!     assert_eq!(session.measure().await.unwrap().as_f32(), 1.25);
//! }
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::SessionConfig;
use crate::error::{LinkError, Result};
use crate::framing::MAX_DATAGRAM_LEN;
use crate::transport::SerialTransport;
use crate::wifi::{NetworkCell, WifiFacility, WirelessCredentials};

/// Buffer size of the in-memory serial link
const SERIAL_PAIR_BUFFER: usize = 256;

/// Create a serial transport connected to an in-memory device end
///
/// Bytes written to the returned [`DuplexStream`] arrive as the device's
/// response; the command bytes the transport sends can be read from it.
pub fn serial_pair(config: &SessionConfig) -> (SerialTransport<DuplexStream>, DuplexStream) {
    let (host, device) = tokio::io::duplex(SERIAL_PAIR_BUFFER);
    (SerialTransport::from_config(host, &config.serial), device)
}

/// A profile the mock facility was asked to create
#[derive(Debug, Clone)]
pub struct ProvisionedProfile {
    /// Interface the profile was created on
    pub interface: String,
    /// Profile name
    pub profile_name: String,
    /// Credentials supplied
    pub credentials: WirelessCredentials,
}

#[derive(Debug, Default)]
struct MockWifiState {
    cells: Vec<NetworkCell>,
    scan_error: Option<String>,
    provision_error: Option<String>,
    scanned_interfaces: Vec<String>,
    provision_attempts: usize,
    profiles: Vec<ProvisionedProfile>,
}

/// Mock Wi-Fi facility for testing without a radio
///
/// Clones share state, so a test can keep one handle while a session owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockWifiFacility {
    state: Arc<Mutex<MockWifiState>>,
}

impl MockWifiFacility {
    /// Create a facility with no visible networks
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a facility that reports `cells` on every scan
    pub fn with_cells(cells: Vec<NetworkCell>) -> Self {
        let facility = Self::new();
        facility.set_cells(cells);
        facility
    }

    /// Replace the cells reported by later scans
    pub fn set_cells(&self, cells: Vec<NetworkCell>) {
        self.lock().cells = cells;
    }

    /// Make later scans fail with `reason`
    pub fn fail_scans(&self, reason: impl Into<String>) {
        self.lock().scan_error = Some(reason.into());
    }

    /// Make later provisioning attempts fail with `reason`
    pub fn fail_provisioning(&self, reason: impl Into<String>) {
        self.lock().provision_error = Some(reason.into());
    }

    /// Interfaces scanned so far, in order
    pub fn scanned_interfaces(&self) -> Vec<String> {
        self.lock().scanned_interfaces.clone()
    }

    /// Number of provisioning calls, successful or not
    pub fn provision_attempts(&self) -> usize {
        self.lock().provision_attempts
    }

    /// Profiles successfully created so far
    pub fn profiles(&self) -> Vec<ProvisionedProfile> {
        self.lock().profiles.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockWifiState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl WifiFacility for MockWifiFacility {
    async fn list_cells(&self, interface: &str) -> Result<Vec<NetworkCell>> {
        let mut state = self.lock();
        state.scanned_interfaces.push(interface.to_owned());

        if let Some(reason) = &state.scan_error {
            return Err(LinkError::ScanFailed {
                interface: interface.to_owned(),
                reason: reason.clone(),
            });
        }
        Ok(state.cells.clone())
    }

    async fn create_and_activate_profile(
        &self,
        interface: &str,
        profile_name: &str,
        credentials: &WirelessCredentials,
    ) -> Result<()> {
        let mut state = self.lock();
        state.provision_attempts += 1;

        if let Some(reason) = &state.provision_error {
            return Err(LinkError::ProvisioningFailed {
                ssid: credentials.ssid.clone(),
                reason: reason.clone(),
            });
        }

        state.profiles.push(ProvisionedProfile {
            interface: interface.to_owned(),
            profile_name: profile_name.to_owned(),
            credentials: credentials.clone(),
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "MockWifiFacility"
    }
}

/// In-memory responder that plays the device's serial side
///
/// Every command byte is recorded and answered with the next scripted
/// reply. An empty reply keeps the stub silent for that command, and so
/// does running out of script.
#[derive(Debug)]
pub struct SerialDeviceStub {
    received: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl SerialDeviceStub {
    /// Answer commands arriving on `device` with `replies` in order
    pub fn replying(mut device: DuplexStream, replies: Vec<Vec<u8>>) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let mut script: VecDeque<Vec<u8>> = replies.into();
        let task = tokio::spawn(async move {
            let mut command = [0u8; 1];
            while let Ok(1) = device.read(&mut command).await {
                trace!(command = command[0], "Stub received command byte");
                log.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(command[0]);

                match script.pop_front() {
                    Some(reply) if !reply.is_empty() => {
                        if let Err(e) = device.write_all(&reply).await {
                            debug!(error = %e, "Stub reply failed");
                            break;
                        }
                    }
                    _ => trace!("Stub stays silent"),
                }
            }
        });

        Self { received, task }
    }

    /// Keep `device` open but never answer
    pub fn silent(device: DuplexStream) -> Self {
        Self::replying(device, Vec::new())
    }

    /// Command bytes received so far
    pub fn received(&self) -> Vec<u8> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Drop for SerialDeviceStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Loopback UDP responder that plays the device's wireless side
///
/// Every datagram received is recorded. Each one is answered with the next
/// scripted reply; once the script runs out the stub stays silent.
#[derive(Debug)]
pub struct UdpDeviceStub {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    task: JoinHandle<()>,
}

impl UdpDeviceStub {
    /// Start a stub that answers with `replies` in order
    pub async fn replying(replies: Vec<Vec<u8>>) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = socket.local_addr()?;
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let mut script: VecDeque<Vec<u8>> = replies.into();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
            while let Ok((n, from)) = socket.recv_from(&mut buf).await {
                trace!(bytes = n, from = %from, "Stub received datagram");
                log.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(buf[..n].to_vec());

                if let Some(reply) = script.pop_front() {
                    if let Err(e) = socket.send_to(&reply, from).await {
                        debug!(error = %e, "Stub reply failed");
                    }
                }
            }
        });

        Ok(Self {
            addr,
            received,
            task,
        })
    }

    /// Start a stub that never answers
    pub async fn silent() -> Result<Self> {
        Self::replying(Vec::new()).await
    }

    /// Local address of the stub
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// UDP port of the stub
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Datagrams received so far
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Drop for UdpDeviceStub {
    fn drop(&mut self) {
        self.task.abort();
    }
}
