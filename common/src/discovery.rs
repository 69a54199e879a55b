use std::net::IpAddr;
use std::time::Duration;

use anyhow::{bail, Result};
use cast_lib::models::HostTarget;
use log::{debug, warn};
use mdns_sd::{ResolvedService, ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::time::Instant;

use crate::error::CastError;

pub const SERVICE_TYPE: &str = "_castbeam._tcp.local.";
pub const MODEL_NAME: &str = "Castbeam";
pub const FIND_TIMEOUT: Duration = Duration::from_secs(10);

/// Name as used in the discovery record: whitespace stripped, lower-cased.
pub fn local_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether a requested receiver name selects the advertised `friendly` name.
/// An empty request matches anything.
pub fn matches(requested: &str, friendly: &str) -> bool {
    requested.is_empty() || local_name(requested) == local_name(friendly)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
}

impl DeviceInfo {
    pub fn target(&self) -> HostTarget {
        HostTarget::new(self.ip.to_string(), self.port)
    }

    fn from_resolved(service: &ResolvedService) -> Option<Self> {
        if service.get_property_val_str("md") != Some(MODEL_NAME) {
            return None;
        }

        let mut addresses = service
            .get_addresses_v4()
            .iter()
            .copied()
            .collect::<Vec<_>>();
        addresses.sort();
        let ip = addresses.first()?.to_string().parse::<IpAddr>().ok()?;

        let name = service
            .get_property_val_str("fn")
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| {
                service
                    .get_fullname()
                    .trim_end_matches(SERVICE_TYPE)
                    .trim_end_matches('.')
                    .to_owned()
            });

        Some(Self {
            name,
            ip,
            port: service.get_port(),
        })
    }
}

/// Announces a receiver until dropped.
pub struct Advertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Advertiser {
    pub fn start(name: &str, port: u16) -> Result<Self> {
        let ips = crate::net::lan_ipv4_addresses()
            .into_iter()
            .map(IpAddr::V4)
            .collect::<Vec<IpAddr>>();

        if ips.is_empty() {
            bail!("No addresses available to use for mDNS discovery");
        }

        for addr in &ips {
            debug!("Added {addr:?} as service address");
        }

        let instance = local_name(name);
        if instance.is_empty() {
            bail!("Receiver name is empty after normalization");
        }

        let daemon = ServiceDaemon::new()?;
        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &instance,
            &format!("{instance}.local."),
            ips.as_slice(),
            port,
            &[("md", MODEL_NAME), ("fn", name)][..],
        )?;
        let fullname = service.get_fullname().to_owned();

        daemon.register(service)?;

        Ok(Self { daemon, fullname })
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        if let Err(err) = self.daemon.unregister(&self.fullname) {
            warn!("Failed to unregister {}: {err}", self.fullname);
        }
        if let Err(err) = self.daemon.shutdown() {
            debug!("Failed to shut down mDNS daemon: {err}");
        }
    }
}

/// Browses for a receiver named `name` (any receiver when empty).
pub async fn find(name: &str, timeout: Duration) -> Result<DeviceInfo> {
    let daemon = ServiceDaemon::new()?;
    let receiver = daemon.browse(SERVICE_TYPE)?;
    let deadline = Instant::now() + timeout;

    let found = loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break None;
        };

        match tokio::time::timeout(remaining, receiver.recv_async()).await {
            Ok(Ok(ServiceEvent::ServiceResolved(service))) => {
                let Some(device) = DeviceInfo::from_resolved(&service) else {
                    continue;
                };
                debug!("Receiver available: {} ({}:{})", device.name, device.ip, device.port);
                if matches(name, &device.name) {
                    break Some(device);
                }
            }
            Ok(Ok(_)) => (),
            Ok(Err(err)) => {
                warn!("mDNS browse ended: {err}");
                break None;
            }
            Err(_) => break None,
        }
    };

    if let Err(err) = daemon.stop_browse(SERVICE_TYPE) {
        debug!("Failed to stop mDNS browse: {err}");
    }
    if let Err(err) = daemon.shutdown() {
        debug!("Failed to shut down mDNS daemon: {err}");
    }

    match found {
        Some(device) => Ok(device),
        None => Err(CastError::DiscoveryTimeout {
            name: name.to_owned(),
        }
        .into()),
    }
}
