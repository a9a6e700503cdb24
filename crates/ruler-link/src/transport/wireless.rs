//! UDP transport used once the device is reachable over Wi-Fi
//!
//! Each measurement sends a one-byte datagram to the device and waits for a
//! single reply datagram carrying the value as decimal text.
//!
//! The socket is connected to the device, so the kernel discards datagrams
//! from any other sender. Replies that arrive after a timeout are dropped
//! before the next command goes out.

use crate::config::WirelessConfig;
use crate::error::{LinkError, Result};
use crate::framing::{decode_datagram, Delay, MAX_DATAGRAM_LEN};
use crate::transport::{Transport, TransportState};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, error, info, trace, warn};

/// UDP transport to a device at `(host, port)`
pub struct WirelessTransport {
    /// Socket connected to the device (None once closed)
    socket: Option<UdpSocket>,

    /// Device host name or address
    host: String,

    /// Device UDP port
    port: u16,

    /// Upper bound on waiting for the reply
    reply_timeout: Duration,

    /// Receive buffer size
    max_datagram: usize,

    /// Transport name for logging
    name: String,
}

impl WirelessTransport {
    /// Resolve `(host, port)` and connect an ephemeral local socket to it
    ///
    /// The local socket uses the address family of the first resolved
    /// address.
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        config: &WirelessConfig,
    ) -> Result<Self> {
        let host = host.into();
        let remote = resolve(&host, port).await?;

        let local: SocketAddr = if remote.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| LinkError::Socket(format!("bind failed: {}", e)))?;
        socket
            .connect(remote)
            .await
            .map_err(|e| LinkError::Socket(format!("connect to {} failed: {}", remote, e)))?;

        let transport = Self::from_socket(socket, host, port)
            .with_reply_timeout(config.reply_timeout)
            .with_max_datagram(config.max_datagram);

        info!(remote = %transport.name, addr = %remote, "Connected UDP socket");
        Ok(transport)
    }

    /// Wrap a socket already connected to the device
    pub fn from_socket(socket: UdpSocket, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let name = format!("udp:{}:{}", host, port);

        Self {
            socket: Some(socket),
            host,
            port,
            reply_timeout: Duration::from_millis(crate::config::DEFAULT_TIMEOUT_MS),
            max_datagram: MAX_DATAGRAM_LEN,
            name,
        }
    }

    /// Create with custom reply timeout
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Create with custom receive buffer size
    pub fn with_max_datagram(mut self, size: usize) -> Self {
        self.max_datagram = size;
        self
    }

    /// Get the device endpoint
    pub fn remote(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Get the reply timeout
    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Get the local address of the socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let socket = self.socket()?;
        Ok(socket.local_addr()?)
    }

    /// Get the current handle state
    pub fn state(&self) -> TransportState {
        if self.socket.is_some() {
            TransportState::Open
        } else {
            TransportState::Closed
        }
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| LinkError::TransportClosed(self.name.clone()))
    }

    /// Discard datagrams already queued on the socket
    fn drain_stale(&self) -> Result<usize> {
        let socket = self.socket()?;
        let mut buf = vec![0u8; self.max_datagram];
        let mut dropped = 0;

        loop {
            match socket.try_recv(&mut buf) {
                Ok(n) => {
                    dropped += 1;
                    trace!(bytes = n, "Dropped stale datagram");
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                // Reported once for an earlier send; later datagrams may follow.
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => continue,
                Err(e) => {
                    debug!(error = %e, "Stopped draining socket");
                    break;
                }
            }
        }

        if dropped > 0 {
            warn!(dropped, remote = %self.name, "Discarded late replies");
        }
        Ok(dropped)
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| LinkError::Socket(format!("cannot resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| LinkError::Socket(format!("no address for {}", host)))
}

#[async_trait]
impl Transport for WirelessTransport {
    async fn send_command(&mut self, command: u8) -> Result<()> {
        self.drain_stale()?;
        let socket = self.socket()?;

        trace!(command, remote = %self.name, "Sending command datagram");
        socket
            .send(&[command])
            .await
            .map_err(|e| {
                error!(error = %e, remote = %self.name, "UDP send failed");
                LinkError::Socket(e.to_string())
            })?;

        Ok(())
    }

    async fn read_measurement(&mut self) -> Result<Delay> {
        let socket = self.socket()?;
        let mut buf = vec![0u8; self.max_datagram];

        let n = tokio::time::timeout(self.reply_timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| LinkError::Timeout {
                duration_ms: self.reply_timeout.as_millis() as u64,
            })?
            .map_err(|e| {
                error!(error = %e, remote = %self.name, "UDP receive failed");
                LinkError::Socket(e.to_string())
            })?;

        let delay = decode_datagram(&buf[..n])?;
        debug!(bytes = n, delay = %delay, "Wireless measurement");
        Ok(delay)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(socket) = self.socket.take() {
            drop(socket);
            info!(transport = %self.name, "Closed UDP socket");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for WirelessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WirelessTransport")
            .field("remote", &self.name)
            .field("open", &self.socket.is_some())
            .field("reply_timeout", &self.reply_timeout)
            .field("max_datagram", &self.max_datagram)
            .finish()
    }
}
