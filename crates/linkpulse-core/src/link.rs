use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::probe::Probe;

const HOTSPOT_CONNECTION: &str = "Hotspot";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to run {command}: {reason}")]
    Spawn { command: String, reason: String },
    #[error("{command} failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("no active connection on {0}")]
    NoConnection(String),
    #[error("link call timed out after {0:?}")]
    Timeout(Duration),
}

/// Everything the mode controller needs to know about, or do to, the uplink.
#[async_trait]
pub trait LinkState: Send + Sync {
    /// Is there a configured network to attempt at all.
    async fn has_link_credential(&self) -> Result<bool, LinkError>;
    /// Can the wider network be reached right now.
    async fn is_link_usable(&self) -> Result<bool, LinkError>;
    async fn revoke_credential(&self) -> Result<(), LinkError>;
    async fn begin_provisioning(&self) -> Result<(), LinkError>;
}

/// NetworkManager-backed link state for a single wireless interface.
pub struct NmcliLink {
    interface: String,
    target: String,
    probe: Arc<dyn Probe>,
    probe_timeout: Duration,
    hotspot_ssid: String,
    hotspot_password: String,
}

impl NmcliLink {
    pub fn new(
        interface: impl Into<String>,
        target: impl Into<String>,
        probe: Arc<dyn Probe>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            interface: interface.into(),
            target: target.into(),
            probe,
            probe_timeout,
            hotspot_ssid: "linkpulse".to_string(),
            hotspot_password: "linkpulse".to_string(),
        }
    }

    pub fn with_hotspot(mut self, ssid: impl Into<String>, password: impl Into<String>) -> Self {
        self.hotspot_ssid = ssid.into();
        self.hotspot_password = password.into();
        self
    }

    /// Joins `ssid`, storing it as the interface's connection.
    pub async fn install_credential(&self, ssid: &str, password: &str) -> Result<(), LinkError> {
        if let Err(err) = nmcli(&["device", "wifi", "rescan"]).await {
            debug!(%err, "wifi rescan failed");
        }
        let stdout = nmcli(&[
            "device",
            "wifi",
            "connect",
            ssid,
            "password",
            password,
            "ifname",
            &self.interface,
        ])
        .await?;
        info!(%ssid, interface = %self.interface, "network credential installed");
        debug!(output = %stdout.trim(), "nmcli connect");
        Ok(())
    }

    async fn active_connection(&self) -> Result<Option<DeviceStatus>, LinkError> {
        let stdout = nmcli(&["-t", "-f", "DEVICE,STATE,CONNECTION", "device", "status"]).await?;
        Ok(parse_device_status(&stdout)
            .into_iter()
            .find(|status| status.device == self.interface))
    }

    async fn has_ipv4(&self) -> Result<bool, LinkError> {
        let stdout = nmcli(&["-t", "-g", "IP4.ADDRESS", "device", "show", &self.interface]).await?;
        Ok(stdout.lines().any(|line| !line.trim().is_empty()))
    }
}

#[async_trait]
impl LinkState for NmcliLink {
    async fn has_link_credential(&self) -> Result<bool, LinkError> {
        Ok(self
            .active_connection()
            .await?
            .is_some_and(|status| status.is_client_connection()))
    }

    async fn is_link_usable(&self) -> Result<bool, LinkError> {
        if !self.has_ipv4().await? {
            debug!(interface = %self.interface, "no IPv4 address");
            return Ok(false);
        }
        match self.probe.probe(&self.target, self.probe_timeout).await {
            Ok(reply) => Ok(reply.answered),
            Err(err) => {
                debug!(%err, "usability probe failed");
                Ok(false)
            }
        }
    }

    async fn revoke_credential(&self) -> Result<(), LinkError> {
        let Some(status) = self.active_connection().await? else {
            return Err(LinkError::NoConnection(self.interface.clone()));
        };
        if !status.is_client_connection() {
            return Err(LinkError::NoConnection(self.interface.clone()));
        }
        nmcli(&["connection", "delete", &status.connection]).await?;
        info!(connection = %status.connection, "network credential removed");
        Ok(())
    }

    async fn begin_provisioning(&self) -> Result<(), LinkError> {
        nmcli(&[
            "device",
            "wifi",
            "hotspot",
            "ifname",
            &self.interface,
            "ssid",
            &self.hotspot_ssid,
            "password",
            &self.hotspot_password,
        ])
        .await?;
        info!(ssid = %self.hotspot_ssid, "setup hotspot started");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceStatus {
    pub device: String,
    pub state: String,
    pub connection: String,
}

impl DeviceStatus {
    fn is_client_connection(&self) -> bool {
        self.state == "connected" && !self.connection.is_empty() && self.connection != HOTSPOT_CONNECTION
    }
}

/// Parses `nmcli -t -f DEVICE,STATE,CONNECTION device status`.
pub(crate) fn parse_device_status(stdout: &str) -> Vec<DeviceStatus> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.splitn(3, ':');
            let device = fields.next()?.trim();
            let state = fields.next()?.trim();
            let connection = fields.next().unwrap_or_default().trim();
            if device.is_empty() {
                return None;
            }
            Some(DeviceStatus {
                device: device.to_string(),
                state: state.to_ascii_lowercase(),
                connection: connection.replace("\\:", ":"),
            })
        })
        .collect()
}

async fn nmcli(args: &[&str]) -> Result<String, LinkError> {
    // subcommand only; later arguments can carry a password
    let subcommand = args
        .iter()
        .filter(|arg| !arg.starts_with('-'))
        .take(2)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let command = format!("nmcli {subcommand}");
    let output = Command::new("nmcli")
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| LinkError::Spawn {
            command: command.clone(),
            reason: err.to_string(),
        })?;

    if !output.status.success() {
        return Err(LinkError::Command {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
