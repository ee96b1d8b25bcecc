//! Host network adapter
//!
//! On a host the operating system owns association, so "address acquired"
//! means the kernel can route from a local address to the probe host. The
//! adapter paces its own retries: a failed attempt is reported as a
//! disconnect only after the retry interval has elapsed, mirroring how a
//! radio stack reports a failed association.

use super::{NetworkEvent, NetworkStack};
use crate::error::LinkError;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Network stack backed by the host's routing table
pub struct HostNetwork {
    ssid: String,
    secured: bool,
    probe_addr: String,
    retry_interval: Duration,
    probe_interval: Duration,
    events: mpsc::Sender<NetworkEvent>,
}

impl HostNetwork {
    pub fn new(
        ssid: impl Into<String>,
        passphrase: Option<String>,
        probe_addr: impl Into<String>,
        retry_interval: Duration,
        probe_interval: Duration,
        events: mpsc::Sender<NetworkEvent>,
    ) -> Self {
        Self {
            ssid: ssid.into(),
            secured: passphrase.is_some(),
            probe_addr: probe_addr.into(),
            retry_interval,
            probe_interval,
            events,
        }
    }
}

impl NetworkStack for HostNetwork {
    fn start(&self) -> Result<(), LinkError> {
        info!(ssid = %self.ssid, secured = self.secured, "Starting network stack");
        self.events
            .try_send(NetworkEvent::StartRequested)
            .map_err(|e| LinkError::ConnectRejected(format!("event channel: {e}")))
    }

    fn connect(&self) -> Result<(), LinkError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| LinkError::ConnectRejected(e.to_string()))?;

        if self.events.is_closed() {
            return Err(LinkError::ConnectRejected(
                "event channel closed".to_string(),
            ));
        }

        debug!(ssid = %self.ssid, probe = %self.probe_addr, "Association attempt");
        handle.spawn(run_attempt(
            self.probe_addr.clone(),
            self.retry_interval,
            self.probe_interval,
            self.events.clone(),
        ));
        Ok(())
    }
}

/// One association attempt followed by monitoring while the link holds
async fn run_attempt(
    probe_addr: String,
    retry_interval: Duration,
    probe_interval: Duration,
    events: mpsc::Sender<NetworkEvent>,
) {
    let address = match probe_local_address(&probe_addr).await {
        Ok(address) => address,
        Err(e) => {
            warn!(probe = %probe_addr, error = %e, "No route to probe host");
            tokio::time::sleep(retry_interval).await;
            let _ = events
                .send(NetworkEvent::Disconnected {
                    reason: e.to_string(),
                })
                .await;
            return;
        }
    };

    if events
        .send(NetworkEvent::AddressAcquired { address })
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::time::sleep(probe_interval).await;
        match probe_local_address(&probe_addr).await {
            Ok(current) if current == address => continue,
            Ok(current) => {
                let _ = events
                    .send(NetworkEvent::Disconnected {
                        reason: format!("local address changed from {address} to {current}"),
                    })
                    .await;
                return;
            }
            Err(e) => {
                let _ = events
                    .send(NetworkEvent::Disconnected {
                        reason: e.to_string(),
                    })
                    .await;
                return;
            }
        }
    }
}

/// Ask the kernel which local address would be used to reach `probe_addr`
///
/// Connecting a UDP socket sends nothing; it only performs the route lookup.
pub async fn probe_local_address(probe_addr: &str) -> std::io::Result<IpAddr> {
    let target = resolve(probe_addr).await?;
    let bind: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };

    let socket = UdpSocket::bind(bind).await?;
    socket.connect(target).await?;
    let local = socket.local_addr()?.ip();

    if local.is_unspecified() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "no local address assigned",
        ));
    }
    Ok(local)
}

async fn resolve(probe_addr: &str) -> std::io::Result<SocketAddr> {
    tokio::net::lookup_host(probe_addr).await?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("probe address {probe_addr} did not resolve"),
        )
    })
}
