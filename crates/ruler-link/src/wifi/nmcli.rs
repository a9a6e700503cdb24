//! Adapter that drives NetworkManager through the `nmcli` command line tool.
//!
//! Scanning runs `nmcli -t -f SSID,BSSID,SIGNAL,FREQ,SECURITY device wifi
//! list ifname <iface> --rescan yes` and parses the terse output, where `:`
//! separates fields and literal colons (as in BSSIDs) are escaped as `\:`.
//!
//! Provisioning replaces any profile with the same name, adds a new wifi
//! profile for the SSID and brings it up. NetworkManager decides how long
//! association may take. The passkey never appears on a command line: it is
//! written to `nmcli`'s stdin and read back through `passwd-file`.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{LinkError, Result};
use crate::wifi::{NetworkCell, WifiFacility, WirelessCredentials};

const SCAN_FIELDS: &str = "SSID,BSSID,SIGNAL,FREQ,SECURITY";

/// File `nmcli` reads activation secrets from
const SECRETS_FROM_STDIN: &str = "/dev/stdin";

/// [`WifiFacility`] backed by NetworkManager's `nmcli`
#[derive(Debug, Clone)]
pub struct NmcliFacility {
    /// Program to execute (normally `nmcli`)
    program: String,
}

impl NmcliFacility {
    /// Use `nmcli` from `PATH`
    pub fn new() -> Self {
        Self {
            program: "nmcli".to_owned(),
        }
    }

    /// Use a specific executable instead of `nmcli`
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the program and capture stdout, or describe why it failed
    async fn run(&self, args: &[&str]) -> std::result::Result<String, String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to run `{}`: {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run the program with `input` on stdin and capture stdout
    async fn run_with_input(
        &self,
        args: &[&str],
        input: &str,
    ) -> std::result::Result<String, String> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to run `{}`: {e}", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| format!("failed to pass secrets to {}: {e}", self.program))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("failed to wait for `{}`: {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for NmcliFacility {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WifiFacility for NmcliFacility {
    async fn list_cells(&self, interface: &str) -> Result<Vec<NetworkCell>> {
        let args = [
            "-t", "-f", SCAN_FIELDS, "device", "wifi", "list", "ifname", interface, "--rescan",
            "yes",
        ];

        let stdout = self
            .run(&args)
            .await
            .map_err(|reason| LinkError::ScanFailed {
                interface: interface.to_owned(),
                reason,
            })?;

        Ok(parse_cell_list(&stdout))
    }

    async fn create_and_activate_profile(
        &self,
        interface: &str,
        profile_name: &str,
        credentials: &WirelessCredentials,
    ) -> Result<()> {
        let failed = |reason: String| LinkError::ProvisioningFailed {
            ssid: credentials.ssid.clone(),
            reason,
        };

        // A stale profile with the same name would make `add` create a duplicate.
        if let Err(reason) = self.run(&["connection", "delete", "id", profile_name]).await {
            debug!(profile = %profile_name, %reason, "No existing profile removed");
        }

        let add_args = profile_add_args(interface, profile_name, credentials);
        let add_args: Vec<&str> = add_args.iter().map(String::as_str).collect();
        self.run(&add_args).await.map_err(failed)?;

        match activation_secrets(credentials) {
            Some(secrets) => {
                let args = [
                    "connection",
                    "up",
                    "id",
                    profile_name,
                    "passwd-file",
                    SECRETS_FROM_STDIN,
                ];
                self.run_with_input(&args, &secrets).await.map_err(failed)?;
            }
            None => {
                self.run(&["connection", "up", "id", profile_name])
                    .await
                    .map_err(failed)?;
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Arguments for `nmcli connection add` for the given credentials
pub(crate) fn profile_add_args(
    interface: &str,
    profile_name: &str,
    credentials: &WirelessCredentials,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "connection",
        "add",
        "type",
        "wifi",
        "ifname",
        interface,
        "con-name",
        profile_name,
        "ssid",
        credentials.ssid.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if !credentials.is_open() {
        args.extend(["wifi-sec.key-mgmt", "wpa-psk"].iter().map(|s| s.to_string()));
    }

    args
}

/// `passwd-file` contents carrying the passkey, if the network has one
pub(crate) fn activation_secrets(credentials: &WirelessCredentials) -> Option<String> {
    if credentials.is_open() {
        return None;
    }
    Some(format!("802-11-wireless-security.psk:{}\n", credentials.passkey))
}

/// Parse `nmcli -t -f SSID,BSSID,SIGNAL,FREQ,SECURITY` output into cells.
///
/// Hidden networks (empty SSID) and lines without a usable signal value are
/// skipped.
pub fn parse_cell_list(output: &str) -> Vec<NetworkCell> {
    let mut cells = Vec::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_terse_line(line);
        if fields.len() < 3 {
            warn!(line, "Skipping short nmcli line");
            continue;
        }

        let ssid = &fields[0];
        if ssid.is_empty() {
            debug!(bssid = %fields[1], "Skipping hidden network");
            continue;
        }

        let Ok(quality) = fields[2].trim().parse::<i32>() else {
            warn!(line, "Skipping nmcli line with bad SIGNAL");
            continue;
        };

        let frequency_mhz = fields
            .get(3)
            .and_then(|f| f.split_whitespace().next())
            .and_then(|f| f.parse::<u32>().ok());

        let security = fields
            .get(4)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        cells.push(NetworkCell {
            ssid: ssid.clone(),
            bssid: fields[1].to_lowercase(),
            quality,
            frequency_mhz,
            security,
        });
    }

    cells
}

/// Split one terse-mode line on unescaped `:`.
fn split_terse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields
}
