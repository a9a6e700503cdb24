//! Integration tests for the ranging device client
//!
//! These tests drive a full [`DeviceSession`] against in-memory and
//! loopback stand-ins for the device:
//! - Serial measurement over an in-memory byte stream
//! - Network discovery ordering through a mock Wi-Fi facility
//! - The one-way switch to UDP and measurement over it
//! - Error classification and recovery after failures

use ruler_link::test_utils::serial_pair;
use ruler_link::{
    Delay, DeviceSession, FramePolicy, LinkError, MockWifiFacility, Mode, NetworkCell,
    SerialDeviceStub, SessionConfig, SessionConfigBuilder, Transport, UdpDeviceStub,
    WirelessCredentials, MAX_SERIAL_FRAME, MEASURE_COMMAND,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, DuplexStream};

// ============================================================================
// Fixtures
// ============================================================================

fn fast_config() -> SessionConfig {
    SessionConfigBuilder::new()
        .serial_port("/dev/ttyACM0")
        .read_timeout(Duration::from_millis(100))
        .reply_timeout(Duration::from_millis(200))
        .build()
}

fn open_session(
    config: SessionConfig,
    facility: &MockWifiFacility,
) -> (DeviceSession<DuplexStream>, DuplexStream) {
    let (serial, device) = serial_pair(&config);
    let session = DeviceSession::with_transport(serial, config, Arc::new(facility.clone()));
    (session, device)
}

fn word(value: f32) -> Vec<u8> {
    value.to_ne_bytes().to_vec()
}

fn cell(ssid: &str, bssid_suffix: u8, quality: i32) -> NetworkCell {
    NetworkCell::new(ssid, format!("02:00:00:00:00:{bssid_suffix:02x}"), quality)
}

async fn go_wireless(
    session: &mut DeviceSession<DuplexStream>,
    stub: &UdpDeviceStub,
) -> ruler_link::Result<()> {
    let mut serial = session
        .go_wireless("127.0.0.1", stub.port(), &WirelessCredentials::new("lab", "s3cret"))
        .await?;
    serial.close().await
}

// ============================================================================
// Serial Mode Tests
// ============================================================================

#[tokio::test]
async fn test_serial_measurement() {
    let (mut session, device) = open_session(fast_config(), &MockWifiFacility::new());
    let stub = SerialDeviceStub::replying(device, vec![word(1.5)]);

    let delay = session.measure().await.unwrap();

    assert_eq!(delay, Delay::new(1.5));
    assert_eq!(stub.received(), vec![MEASURE_COMMAND]);
}

#[tokio::test]
async fn test_serial_measurements_back_to_back() {
    let (mut session, device) = open_session(fast_config(), &MockWifiFacility::new());
    let stub = SerialDeviceStub::replying(device, vec![word(0.5), word(12.25), word(-3.0)]);

    for value in [0.5f32, 12.25, -3.0] {
        assert_eq!(session.measure().await.unwrap().as_f32(), value);
    }

    assert_eq!(stub.received(), b"mmm".to_vec());
}

#[tokio::test]
async fn test_sixteen_byte_reply_uses_trailing_word() {
    let (mut session, device) = open_session(fast_config(), &MockWifiFacility::new());
    let mut reply = vec![0xAA; 12];
    reply.extend_from_slice(&42.0f32.to_ne_bytes());
    let _stub = SerialDeviceStub::replying(device, vec![reply]);

    assert_eq!(session.measure().await.unwrap().as_f32(), 42.0);
}

#[tokio::test]
async fn test_reply_longer_than_frame_is_rejected() {
    let (mut session, device) = open_session(fast_config(), &MockWifiFacility::new());
    let mut reply = vec![0u8; MAX_SERIAL_FRAME];
    reply.extend_from_slice(&5.0f32.to_ne_bytes());
    let stub = SerialDeviceStub::replying(device, vec![reply]);

    let err = session.measure().await.unwrap_err();
    assert!(matches!(err, LinkError::FrameTooLong { len: 20, max: 16 }));
    assert!(err.is_framing_error());

    let err = session.measure().await.unwrap_err();
    assert!(matches!(err, LinkError::Timeout { .. }));
    assert_eq!(stub.received(), b"mm".to_vec());
}

#[tokio::test]
async fn test_strict_policy_rejects_long_reply() {
    let config = SessionConfigBuilder::new()
        .read_timeout(Duration::from_millis(100))
        .frame_policy(FramePolicy::Strict)
        .build();
    let (mut session, device) = open_session(config, &MockWifiFacility::new());
    let _stub = SerialDeviceStub::replying(device, vec![vec![0u8; 8]]);

    let err = session.measure().await.unwrap_err();
    assert!(matches!(err, LinkError::AmbiguousFrame { len: 8 }));
    assert!(err.is_framing_error());
    assert!(!err.is_device_connection_error());
}

#[tokio::test]
async fn test_silent_device_times_out_within_bound() {
    let (mut session, device) = open_session(fast_config(), &MockWifiFacility::new());
    let _stub = SerialDeviceStub::silent(device);

    let started = Instant::now();
    let err = session.measure().await.unwrap_err();

    assert!(matches!(err, LinkError::Timeout { .. }));
    assert!(err.is_device_connection_error());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(session.mode(), Mode::Serial);
}

#[tokio::test]
async fn test_late_serial_reply_is_not_used_next_round() {
    let (mut session, mut device) = open_session(fast_config(), &MockWifiFacility::new());

    assert!(session.measure().await.is_err());
    device.write_all(&word(7.0)).await.unwrap();

    // The unanswered first command is still queued for the device.
    let stub = SerialDeviceStub::replying(device, vec![Vec::new(), word(8.0)]);
    assert_eq!(session.measure().await.unwrap().as_f32(), 8.0);
    assert_eq!(stub.received(), b"mm".to_vec());
}

// ============================================================================
// Discovery Tests
// ============================================================================

#[tokio::test]
async fn test_discovery_ranks_and_deduplicates() {
    let facility = MockWifiFacility::with_cells(vec![
        cell("A", 1, 30),
        cell("B", 2, 50),
        cell("A", 1, 30),
        cell("C", 3, 50),
    ]);
    let (session, _device) = open_session(fast_config(), &facility);

    let networks = session.discover_networks().await.unwrap();

    assert_eq!(networks, vec!["B", "C", "A"]);
    assert_eq!(facility.scanned_interfaces(), vec!["wlan0".to_string()]);
}

#[tokio::test]
async fn test_discovery_catalog_details() {
    let mut strong = cell("lab", 9, 88);
    strong.security = Some("WPA2".to_string());
    let facility = MockWifiFacility::with_cells(vec![cell("cafe", 1, 20), strong]);
    let (session, _device) = open_session(fast_config(), &facility);

    let catalog = session.discover_catalog().await.unwrap();

    let best = catalog.best().unwrap();
    assert_eq!(best.ssid, "lab");
    assert!(best.is_secured());
    assert!(!catalog.find("cafe").unwrap().is_secured());
}

#[tokio::test]
async fn test_discovery_with_nothing_visible() {
    let (session, _device) = open_session(fast_config(), &MockWifiFacility::new());

    assert!(session.discover_networks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_discovery_failure_leaves_session_intact() {
    let facility = MockWifiFacility::new();
    facility.fail_scans("interface down");
    let (mut session, device) = open_session(fast_config(), &facility);
    let _stub = SerialDeviceStub::replying(device, vec![word(2.0)]);

    let err = session.discover_networks().await.unwrap_err();
    assert!(matches!(err, LinkError::ScanFailed { .. }));
    assert!(!err.is_device_connection_error());

    assert_eq!(session.measure().await.unwrap().as_f32(), 2.0);
}

// ============================================================================
// Wireless Transition Tests
// ============================================================================

#[tokio::test]
async fn test_wireless_measurement_after_switch() {
    let facility = MockWifiFacility::new();
    let (mut session, _device) = open_session(fast_config(), &facility);
    let stub = UdpDeviceStub::replying(vec![b"2.75".to_vec()]).await.unwrap();

    go_wireless(&mut session, &stub).await.unwrap();
    let delay = session.measure().await.unwrap();

    assert_eq!(session.mode(), Mode::Wireless);
    assert_eq!(delay.as_f32(), 2.75);
    assert_eq!(stub.received(), vec![b"m".to_vec()]);

    let profiles = facility.profiles();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].interface, "wlan0");
    assert_eq!(profiles[0].profile_name, "ruler");
    assert_eq!(profiles[0].credentials.ssid, "lab");
}

#[tokio::test]
async fn test_retired_serial_transport_is_returned_open() {
    let (mut session, mut device) = open_session(fast_config(), &MockWifiFacility::new());
    let stub = UdpDeviceStub::silent().await.unwrap();

    let mut serial = session
        .go_wireless("127.0.0.1", stub.port(), &WirelessCredentials::new("lab", ""))
        .await
        .unwrap();

    assert!(serial.is_open());
    assert_eq!(serial.name(), "serial:/dev/ttyACM0");

    serial.send_command(MEASURE_COMMAND).await.unwrap();
    device.write_all(&word(8.0)).await.unwrap();
    assert_eq!(serial.read_measurement().await.unwrap().as_f32(), 8.0);
}

#[tokio::test]
async fn test_malformed_wireless_reply() {
    let (mut session, _device) = open_session(fast_config(), &MockWifiFacility::new());
    let stub = UdpDeviceStub::replying(vec![b"abc".to_vec()]).await.unwrap();

    go_wireless(&mut session, &stub).await.unwrap();
    let err = session.measure().await.unwrap_err();

    assert!(matches!(err, LinkError::MalformedPayload(_)));
    assert!(err.is_device_connection_error());
}

#[tokio::test]
async fn test_wireless_timeout_is_bounded() {
    let (mut session, _device) = open_session(fast_config(), &MockWifiFacility::new());
    let stub = UdpDeviceStub::silent().await.unwrap();

    go_wireless(&mut session, &stub).await.unwrap();

    let started = Instant::now();
    let err = session.measure().await.unwrap_err();
    assert!(matches!(err, LinkError::Timeout { duration_ms: 200 }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(session.mode(), Mode::Wireless);
}

#[tokio::test]
async fn test_provisioning_failure_stays_serial() {
    let facility = MockWifiFacility::new();
    facility.fail_provisioning("wrong passkey");
    let (mut session, device) = open_session(fast_config(), &facility);
    let _serial_stub = SerialDeviceStub::replying(device, vec![word(4.5)]);
    let stub = UdpDeviceStub::silent().await.unwrap();

    let err = go_wireless(&mut session, &stub).await.unwrap_err();

    assert!(matches!(err, LinkError::ProvisioningFailed { .. }));
    assert_eq!(session.mode(), Mode::Serial);
    assert_eq!(session.transport_name(), "serial:/dev/ttyACM0");

    assert_eq!(session.measure().await.unwrap().as_f32(), 4.5);
}

#[tokio::test]
async fn test_second_switch_is_rejected() {
    let facility = MockWifiFacility::new();
    let (mut session, _device) = open_session(fast_config(), &facility);
    let stub = UdpDeviceStub::replying(vec![b"1.0".to_vec()]).await.unwrap();

    go_wireless(&mut session, &stub).await.unwrap();
    let err = go_wireless(&mut session, &stub).await.unwrap_err();

    assert!(matches!(err, LinkError::AlreadyWireless));
    assert_eq!(facility.provision_attempts(), 1);
    assert_eq!(session.measure().await.unwrap().as_f32(), 1.0);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_close_serial_session_twice() {
    let (mut session, _device) = open_session(fast_config(), &MockWifiFacility::new());

    session.close().await.unwrap();
    session.close().await.unwrap();

    assert!(!session.is_open());
    let err = session.measure().await.unwrap_err();
    assert!(matches!(err, LinkError::TransportClosed(_)));
}

#[tokio::test]
async fn test_close_wireless_session() {
    let (mut session, _device) = open_session(fast_config(), &MockWifiFacility::new());
    let stub = UdpDeviceStub::silent().await.unwrap();

    go_wireless(&mut session, &stub).await.unwrap();
    session.close().await.unwrap();
    session.close().await.unwrap();

    assert!(!session.is_open());
    assert_eq!(session.mode(), Mode::Wireless);
}

#[tokio::test]
async fn test_close_after_failed_measurement() {
    let (mut session, device) = open_session(fast_config(), &MockWifiFacility::new());
    drop(device);

    let err = session.measure().await.unwrap_err();
    assert!(err.is_device_connection_error());

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_config_round_trips_through_json() {
    let config = fast_config();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: SessionConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.serial.read_timeout, Duration::from_millis(100));
    assert_eq!(parsed.wireless.reply_timeout, Duration::from_millis(200));
    assert!(parsed.validate().is_ok());
}
