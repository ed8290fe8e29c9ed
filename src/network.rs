use std::{path::PathBuf, process::Command, time::Duration};

use anyhow::{Context as _, anyhow, bail};
use backon::{ConstantBuilder, Retryable};

use crate::config::NetworkCredentials;

pub const SYSFS_NET: &str = "/sys/class/net";
pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    /// Associating or waiting for the interface to come up.
    Connecting,
    Connected,
}

pub trait NetworkLink {
    fn status(&self) -> LinkStatus;

    /// Starts joining the network. Does not wait for the link to come up.
    fn begin(&self, credentials: &NetworkCredentials) -> Result<(), anyhow::Error>;
}

/// Wireless interface managed by NetworkManager, observed through sysfs.
#[derive(Debug, Clone)]
pub struct SysfsLink {
    interface: String,
    root: PathBuf,
}

impl SysfsLink {
    pub fn new(interface: &str) -> SysfsLink {
        SysfsLink {
            interface: interface.to_string(),
            root: PathBuf::from(SYSFS_NET),
        }
    }

    fn operstate_path(&self) -> PathBuf {
        self.root.join(&self.interface).join("operstate")
    }
}

impl NetworkLink for SysfsLink {
    fn status(&self) -> LinkStatus {
        match std::fs::read_to_string(self.operstate_path()) {
            Ok(state) => parse_operstate(&state),
            Err(_) => LinkStatus::Disconnected,
        }
    }

    fn begin(&self, credentials: &NetworkCredentials) -> Result<(), anyhow::Error> {
        let mut command = Command::new("nmcli");
        command
            .args(["device", "wifi", "connect"])
            .arg(&credentials.ssid)
            .args(["ifname", self.interface.as_str()]);
        if credentials.password.is_empty() {
            log::info!("WiFi password is empty, using open network");
        } else {
            command.arg("password").arg(&credentials.password);
        }

        let output = command.output().context("Failed to run nmcli")?;
        if !output.status.success() {
            bail!(
                "nmcli failed to join '{}': {}",
                credentials.ssid,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}

pub fn parse_operstate(state: &str) -> LinkStatus {
    match state.trim() {
        "up" => LinkStatus::Connected,
        "dormant" => LinkStatus::Connecting,
        _ => LinkStatus::Disconnected,
    }
}

/// Joins the network and polls until the link is connected. Never gives up.
pub async fn join<L: NetworkLink + Sync>(
    link: &L,
    credentials: &NetworkCredentials,
) -> Result<(), anyhow::Error> {
    if link.status() == LinkStatus::Connected {
        log::info!("WiFi already connected");
        return Ok(());
    }

    log::info!("Connecting to '{}'...", credentials.ssid);
    if let Err(e) = link.begin(credentials) {
        log::error!("{e:#}");
    }

    let poll = ConstantBuilder::default()
        .with_delay(JOIN_POLL_INTERVAL)
        .without_max_times();

    (move || async move {
        match link.status() {
            LinkStatus::Connected => Ok(()),
            status => Err(anyhow!("WiFi link is {status:?}")),
        }
    })
    .retry(poll)
    .notify(|e, _| log::debug!("{e}"))
    .await?;

    log::info!("WiFi connected");
    Ok(())
}
