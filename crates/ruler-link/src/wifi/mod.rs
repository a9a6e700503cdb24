//! Wi-Fi discovery and provisioning
//!
//! The OS scanning/association facility sits behind the [`WifiFacility`]
//! port. [`NmcliFacility`] talks to NetworkManager; tests use
//! [`crate::test_utils::MockWifiFacility`].
//!
//! - [`NetworkDiscovery`] ranks and deduplicates the cells a scan returns
//! - [`WirelessProvisioner`] joins one of them

mod discovery;
mod nmcli;
mod provisioner;

pub use discovery::{NetworkCatalog, NetworkDiscovery};
pub use nmcli::{parse_cell_list, NmcliFacility};
pub use provisioner::WirelessProvisioner;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Port to the OS Wi-Fi facility
#[async_trait]
pub trait WifiFacility: Send + Sync {
    /// Enumerate the access points currently visible on `interface`
    async fn list_cells(&self, interface: &str) -> Result<Vec<NetworkCell>>;

    /// Create a connection profile for `credentials` and join the network
    ///
    /// Blocks for as long as the OS takes to associate.
    async fn create_and_activate_profile(
        &self,
        interface: &str,
        profile_name: &str,
        credentials: &WirelessCredentials,
    ) -> Result<()>;

    /// Get the facility name (for logging)
    fn name(&self) -> &str;
}

/// One observed wireless access point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCell {
    /// Network name
    pub ssid: String,

    /// Access point MAC address, lowercase colon-separated
    pub bssid: String,

    /// Signal quality (higher is better)
    pub quality: i32,

    /// Channel frequency, if reported
    #[serde(default)]
    pub frequency_mhz: Option<u32>,

    /// Security description (e.g. "WPA2"), if reported
    #[serde(default)]
    pub security: Option<String>,
}

impl NetworkCell {
    /// Create a cell with just the identity and quality
    pub fn new(ssid: impl Into<String>, bssid: impl Into<String>, quality: i32) -> Self {
        Self {
            ssid: ssid.into(),
            bssid: bssid.into(),
            quality,
            frequency_mhz: None,
            security: None,
        }
    }

    /// Identity used for deduplication
    pub fn key(&self) -> CellKey {
        CellKey {
            ssid: self.ssid.clone(),
            bssid: self.bssid.clone(),
        }
    }

    /// Check if the network advertises any security
    pub fn is_secured(&self) -> bool {
        self.security
            .as_deref()
            .map(|s| !s.is_empty() && s != "--")
            .unwrap_or(false)
    }
}

/// Identity of an access point: two cells with equal keys are the same AP
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CellKey {
    /// Network name
    pub ssid: String,
    /// Access point MAC address
    pub bssid: String,
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.ssid, self.bssid)
    }
}

/// SSID and passkey for joining a network
#[derive(Clone, PartialEq, Eq)]
pub struct WirelessCredentials {
    /// Network to join
    pub ssid: String,
    /// Pre-shared key (empty for open networks)
    pub passkey: String,
}

impl WirelessCredentials {
    /// Create credentials
    pub fn new(ssid: impl Into<String>, passkey: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            passkey: passkey.into(),
        }
    }

    /// Check if this is an open network
    pub fn is_open(&self) -> bool {
        self.passkey.is_empty()
    }
}

impl std::fmt::Debug for WirelessCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WirelessCredentials")
            .field("ssid", &self.ssid)
            .field("passkey", &"<redacted>")
            .finish()
    }
}
