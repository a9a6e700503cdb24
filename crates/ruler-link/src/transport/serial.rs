//! Serial transport for the ranging device
//!
//! The device answers `m` with up to 16 raw bytes. A read collects bytes
//! until 16 have arrived, the stream hits EOF, or the read timeout expires,
//! then hands them to [`decode_serial_frame`].
//!
//! Pending input is discarded before each command, and bytes that keep
//! coming after a full frame make the read fail with
//! [`LinkError::FrameTooLong`]. A reply always belongs to the command that
//! was just sent.

use crate::config::SerialConfig;
use crate::error::{LinkError, Result};
use crate::framing::{decode_serial_frame, Delay, FramePolicy, MAX_SERIAL_FRAME};
use crate::transport::{Transport, TransportState};
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

#[cfg(feature = "serial")]
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

/// How long to wait for bytes past a full frame before accepting it
const OVERRUN_GRACE: Duration = Duration::from_millis(20);

/// Serial transport over any async byte stream
///
/// With the `serial` feature, [`SerialTransport::open`] builds one over a
/// real port. Tests drive it with an in-memory duplex stream.
pub struct SerialTransport<P> {
    /// Byte stream to the device (None once closed)
    port: Option<P>,

    /// Upper bound on a single measurement read
    read_timeout: Duration,

    /// Handling of responses longer than one float
    frame_policy: FramePolicy,

    /// Transport name for logging
    name: String,
}

impl<P> SerialTransport<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already open byte stream
    pub fn new(port: P, name: impl Into<String>) -> Self {
        Self {
            port: Some(port),
            read_timeout: Duration::from_millis(crate::config::DEFAULT_TIMEOUT_MS),
            frame_policy: FramePolicy::default(),
            name: name.into(),
        }
    }

    /// Wrap a byte stream using the timeout and frame policy from `config`
    pub fn from_config(port: P, config: &SerialConfig) -> Self {
        Self::new(port, format!("serial:{}", config.port.display()))
            .with_read_timeout(config.read_timeout)
            .with_frame_policy(config.frame_policy)
    }

    /// Create with custom read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Create with custom frame policy
    pub fn with_frame_policy(mut self, policy: FramePolicy) -> Self {
        self.frame_policy = policy;
        self
    }

    /// Get the read timeout
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Get the frame policy
    pub fn frame_policy(&self) -> FramePolicy {
        self.frame_policy
    }

    /// Get the current handle state
    pub fn state(&self) -> TransportState {
        if self.port.is_some() {
            TransportState::Open
        } else {
            TransportState::Closed
        }
    }

    /// Collect one response of at most [`MAX_SERIAL_FRAME`] bytes
    async fn read_frame(&mut self) -> Result<BytesMut> {
        let read_timeout = self.read_timeout;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| LinkError::TransportClosed(self.name.clone()))?;

        let deadline = Instant::now() + read_timeout;
        let mut frame = BytesMut::with_capacity(MAX_SERIAL_FRAME);
        let mut buf = [0u8; MAX_SERIAL_FRAME];

        while frame.len() < MAX_SERIAL_FRAME {
            let want = MAX_SERIAL_FRAME - frame.len();

            match tokio::time::timeout_at(deadline, port.read(&mut buf[..want])).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    if frame.is_empty() {
                        return Err(LinkError::Disconnected);
                    }
                    break;
                }
                Ok(Ok(n)) => {
                    trace!(bytes = n, "Read from serial port");
                    frame.extend_from_slice(&buf[..n]);
                }
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Ok(Err(e)) => {
                    error!(error = %e, "Serial read error");
                    return Err(LinkError::ReadError(e.to_string()));
                }
            }
        }

        if frame.is_empty() {
            return Err(LinkError::Timeout {
                duration_ms: read_timeout.as_millis() as u64,
            });
        }

        if frame.len() == MAX_SERIAL_FRAME {
            let grace = std::cmp::min(deadline, Instant::now() + OVERRUN_GRACE);
            let surplus = drain_until(port, grace).await;
            if surplus > 0 {
                let len = frame.len() + surplus;
                warn!(len, max = MAX_SERIAL_FRAME, "Serial reply overran frame");
                return Err(LinkError::FrameTooLong {
                    len,
                    max: MAX_SERIAL_FRAME,
                });
            }
        }

        Ok(frame)
    }
}

/// Read and discard whatever arrives before `until`, returning the count
///
/// Stops early at EOF or on a read error; those surface on the next read.
async fn drain_until<P>(port: &mut P, until: Instant) -> usize
where
    P: AsyncRead + Unpin,
{
    let mut buf = [0u8; MAX_SERIAL_FRAME];
    let mut drained = 0;

    while let Ok(Ok(n)) = tokio::time::timeout_at(until, port.read(&mut buf)).await {
        if n == 0 {
            break;
        }
        drained += n;
    }

    drained
}

#[cfg(feature = "serial")]
impl SerialTransport<SerialStream> {
    /// Open the serial port named in `config`
    ///
    /// Fails with [`LinkError::PortNotFound`] or [`LinkError::PortOpenFailed`];
    /// no retry is attempted.
    pub async fn open(config: &SerialConfig) -> Result<Self> {
        let port_name = config.port.display().to_string();
        info!(port = %port_name, baud = config.baud_rate, "Opening serial port");

        if cfg!(unix) && !config.port.exists() {
            return Err(LinkError::PortNotFound(port_name));
        }

        let stream = tokio_serial::new(config.port.to_string_lossy(), config.baud_rate)
            .timeout(config.read_timeout)
            .open_native_async()
            .map_err(|e| LinkError::from(e).for_port(&port_name))?;

        stream
            .clear(ClearBuffer::Input)
            .map_err(|e| LinkError::from(e).for_port(&port_name))?;

        info!(port = %port_name, "Connected to ranging device");
        Ok(Self::from_config(stream, config))
    }
}

/// List the names of serial ports visible to the OS
///
/// With the `udev` feature, Linux ports are enumerated through libudev.
#[cfg(feature = "serial")]
pub fn available_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()?;
    debug!(count = ports.len(), "Enumerated serial ports");
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[async_trait]
impl<P> Transport for SerialTransport<P>
where
    P: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_command(&mut self, command: u8) -> Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| LinkError::TransportClosed(self.name.clone()))?;

        let stale = drain_until(port, Instant::now()).await;
        if stale > 0 {
            warn!(bytes = stale, transport = %self.name, "Discarded stale serial input");
        }

        trace!(command, "Writing command byte");
        port.write_all(&[command]).await.map_err(|e| {
            error!(error = %e, "Serial write error");
            LinkError::WriteError(e.to_string())
        })?;

        port.flush()
            .await
            .map_err(|e| LinkError::WriteError(format!("Flush failed: {}", e)))?;

        Ok(())
    }

    async fn read_measurement(&mut self) -> Result<Delay> {
        let frame = self.read_frame().await?;
        let delay = decode_serial_frame(&frame, self.frame_policy)?;

        debug!(bytes = frame.len(), delay = %delay, "Serial measurement");
        Ok(delay)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(port) = self.port.take() {
            drop(port);
            info!(transport = %self.name, "Closed serial port");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<P> std::fmt::Debug for SerialTransport<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("open", &self.port.is_some())
            .field("read_timeout", &self.read_timeout)
            .field("frame_policy", &self.frame_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{encode_serial_frame, MEASURE_COMMAND};
    use tokio::io::DuplexStream;

    fn transport(timeout_ms: u64) -> (SerialTransport<DuplexStream>, DuplexStream) {
        let (host, device) = tokio::io::duplex(64);
        let transport = SerialTransport::new(host, "serial:test")
            .with_read_timeout(Duration::from_millis(timeout_ms));
        (transport, device)
    }

    #[tokio::test]
    async fn test_send_command_writes_single_byte() {
        let (mut transport, mut device) = transport(100);

        transport.send_command(MEASURE_COMMAND).await.unwrap();

        let mut buf = [0u8; 1];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[0], b'm');
    }

    #[tokio::test]
    async fn test_full_word_reply() {
        let (mut transport, mut device) = transport(100);

        device
            .write_all(&encode_serial_frame(Delay::new(6.75)))
            .await
            .unwrap();

        let delay = transport.read_measurement().await.unwrap();
        assert_eq!(delay.as_f32(), 6.75);
    }

    #[tokio::test]
    async fn test_truncated_reply_is_padded() {
        let (mut transport, mut device) = transport(100);
        let full = 1.0e-30f32.to_ne_bytes();

        device.write_all(&full[2..]).await.unwrap();

        let delay = transport.read_measurement().await.unwrap();
        let expected = f32::from_ne_bytes([0, 0, full[2], full[3]]);
        assert_eq!(delay.as_f32().to_bits(), expected.to_bits());
    }

    #[tokio::test]
    async fn test_full_frame_returns_without_waiting() {
        let (mut transport, mut device) = transport(60_000);
        let mut reply = vec![0u8; 12];
        reply.extend_from_slice(&9.5f32.to_ne_bytes());

        device.write_all(&reply).await.unwrap();

        let delay = tokio::time::timeout(Duration::from_secs(5), transport.read_measurement())
            .await
            .expect("read should finish once 16 bytes arrived")
            .unwrap();
        assert_eq!(delay.as_f32(), 9.5);
    }

    #[tokio::test]
    async fn test_strict_policy_surfaces_framing_error() {
        let (transport, mut device) = transport(100);
        let mut transport = transport.with_frame_policy(FramePolicy::Strict);

        device.write_all(&[1, 2, 3, 4, 5, 6]).await.unwrap();

        let err = transport.read_measurement().await.unwrap_err();
        assert!(err.is_framing_error());
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let (mut transport, _device) = transport(50);

        let started = std::time::Instant::now();
        let err = transport.read_measurement().await.unwrap_err();

        assert!(matches!(err, LinkError::Timeout { duration_ms: 50 }));
        assert!(err.is_device_connection_error());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_hangup_is_disconnected() {
        let (mut transport, device) = transport(1000);
        drop(device);

        let err = transport.read_measurement().await.unwrap_err();
        assert!(matches!(err, LinkError::Disconnected));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (mut transport, _device) = transport(100);
        assert_eq!(transport.state(), TransportState::Open);

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(!transport.is_open());
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(matches!(
            transport.send_command(MEASURE_COMMAND).await,
            Err(LinkError::TransportClosed(_))
        ));
        assert!(matches!(
            transport.read_measurement().await,
            Err(LinkError::TransportClosed(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let (host, _device) = tokio::io::duplex(8);
        let config = SerialConfig {
            read_timeout: Duration::from_millis(300),
            frame_policy: FramePolicy::Strict,
            ..SerialConfig::default()
        };
        let transport = SerialTransport::from_config(host, &config);

        assert_eq!(transport.name(), "serial:/dev/ttyUSB0");
        assert_eq!(transport.read_timeout(), Duration::from_millis(300));
        assert_eq!(transport.frame_policy(), FramePolicy::Strict);
    }

    #[cfg(all(feature = "serial", unix))]
    #[tokio::test]
    async fn test_open_missing_port_names_port() {
        let config = SerialConfig {
            port: "/dev/ruler-link-missing".into(),
            ..SerialConfig::default()
        };

        let err = SerialTransport::open(&config).await.unwrap_err();
        match err {
            LinkError::PortNotFound(port) => assert_eq!(port, "/dev/ruler-link-missing"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stale_input_discarded_before_command() {
        let (mut transport, mut device) = transport(100);
        device.write_all(&1.0f32.to_ne_bytes()).await.unwrap();

        transport.send_command(MEASURE_COMMAND).await.unwrap();
        let mut command = [0u8; 1];
        device.read_exact(&mut command).await.unwrap();
        device.write_all(&2.0f32.to_ne_bytes()).await.unwrap();

        assert_eq!(transport.read_measurement().await.unwrap().as_f32(), 2.0);
    }

    #[tokio::test]
    async fn test_overlong_reply_is_rejected_and_drained() {
        let (mut transport, mut device) = transport(100);
        let mut reply = vec![0u8; MAX_SERIAL_FRAME];
        reply.extend_from_slice(&5.0f32.to_ne_bytes());

        device.write_all(&reply).await.unwrap();
        let err = transport.read_measurement().await.unwrap_err();
        assert!(matches!(err, LinkError::FrameTooLong { len: 20, max: 16 }));

        transport.send_command(MEASURE_COMMAND).await.unwrap();
        assert!(matches!(
            transport.read_measurement().await,
            Err(LinkError::Timeout { .. })
        ));
    }
}
