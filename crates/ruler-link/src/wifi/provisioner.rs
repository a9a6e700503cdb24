//! Joining a Wi-Fi network
//!
//! Provisioning creates a named connection profile for an SSID/passkey on
//! one interface and activates it. The call blocks for as long as the OS
//! facility takes to associate; no timeout is added here.

use std::sync::Arc;
use tracing::{error, info};

use crate::config::WirelessConfig;
use crate::error::{LinkError, Result};
use crate::wifi::{WifiFacility, WirelessCredentials};

/// Creates and activates connection profiles through a [`WifiFacility`]
#[derive(Clone)]
pub struct WirelessProvisioner {
    facility: Arc<dyn WifiFacility>,
    interface: String,
    profile_name: String,
}

impl WirelessProvisioner {
    /// Create a provisioner for `interface`, saving profiles as `profile_name`
    pub fn new(
        facility: Arc<dyn WifiFacility>,
        interface: impl Into<String>,
        profile_name: impl Into<String>,
    ) -> Self {
        Self {
            facility,
            interface: interface.into(),
            profile_name: profile_name.into(),
        }
    }

    /// Create from the wireless section of a session config
    pub fn from_config(facility: Arc<dyn WifiFacility>, config: &WirelessConfig) -> Self {
        Self::new(facility, &config.interface, &config.profile_name)
    }

    /// Get the interface profiles are created on
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Get the profile name
    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    /// Join the network named in `credentials`
    pub async fn provision(&self, credentials: &WirelessCredentials) -> Result<()> {
        if credentials.ssid.is_empty() {
            return Err(LinkError::InvalidConfig("SSID is empty".to_string()));
        }

        info!(
            interface = %self.interface,
            profile = %self.profile_name,
            ssid = %credentials.ssid,
            open = credentials.is_open(),
            "Provisioning Wi-Fi profile"
        );

        self.facility
            .create_and_activate_profile(&self.interface, &self.profile_name, credentials)
            .await
            .map_err(|e| {
                error!(ssid = %credentials.ssid, error = %e, "Provisioning failed");
                e
            })?;

        info!(ssid = %credentials.ssid, "Joined Wi-Fi network");
        Ok(())
    }
}

impl std::fmt::Debug for WirelessProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WirelessProvisioner")
            .field("facility", &self.facility.name())
            .field("interface", &self.interface)
            .field("profile_name", &self.profile_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockWifiFacility;

    #[tokio::test]
    async fn test_provision_records_profile() {
        let facility = MockWifiFacility::new();
        let provisioner = WirelessProvisioner::new(Arc::new(facility.clone()), "wlan0", "ruler");

        provisioner
            .provision(&WirelessCredentials::new("lab", "s3cret"))
            .await
            .unwrap();

        let profiles = facility.profiles();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].interface, "wlan0");
        assert_eq!(profiles[0].profile_name, "ruler");
        assert_eq!(profiles[0].credentials.ssid, "lab");
        assert_eq!(profiles[0].credentials.passkey, "s3cret");
    }

    #[tokio::test]
    async fn test_provision_failure_is_propagated() {
        let facility = MockWifiFacility::new();
        facility.fail_provisioning("bad passkey");
        let provisioner =
            WirelessProvisioner::from_config(Arc::new(facility.clone()), &WirelessConfig::default());

        let err = provisioner
            .provision(&WirelessCredentials::new("lab", "wrong"))
            .await
            .unwrap_err();

        match err {
            LinkError::ProvisioningFailed { ssid, reason } => {
                assert_eq!(ssid, "lab");
                assert_eq!(reason, "bad passkey");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(facility.profiles().is_empty());
    }

    #[tokio::test]
    async fn test_empty_ssid_rejected_before_facility() {
        let facility = MockWifiFacility::new();
        let provisioner = WirelessProvisioner::new(Arc::new(facility.clone()), "wlan0", "ruler");

        let err = provisioner
            .provision(&WirelessCredentials::new("", "x"))
            .await
            .unwrap_err();

        assert!(matches!(err, LinkError::InvalidConfig(_)));
        assert_eq!(facility.provision_attempts(), 0);
    }
}
