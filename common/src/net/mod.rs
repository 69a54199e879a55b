use std::net::{IpAddr, Ipv4Addr};

pub fn get_all_ip_addresses() -> Vec<IpAddr> {
    let mut addrs = Vec::new();
    for iface in pnet_datalink::interfaces() {
        for ip in iface.ips {
            match ip {
                ipnetwork::IpNetwork::V4(v4) => addrs.push(IpAddr::V4(v4.ip())),
                ipnetwork::IpNetwork::V6(v6) => addrs.push(IpAddr::V6(v6.ip())),
            }
        }
    }
    addrs
}

/// Addresses other devices on the LAN can reach us at.
pub fn lan_ipv4_addresses() -> Vec<Ipv4Addr> {
    get_all_ip_addresses()
        .into_iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
            _ => None,
        })
        .collect()
}

/// Picks the local address that shares a /24 with `peer`, else the first LAN
/// address, else loopback.
pub fn local_address_for(peer: &IpAddr) -> IpAddr {
    let candidates = lan_ipv4_addresses();
    if let IpAddr::V4(peer) = peer {
        if peer.is_loopback() {
            return IpAddr::V4(Ipv4Addr::LOCALHOST);
        }
        if let Some(same_subnet) = candidates
            .iter()
            .find(|ip| ip.octets()[..3] == peer.octets()[..3])
        {
            return IpAddr::V4(*same_subnet);
        }
    }

    candidates
        .first()
        .map(|ip| IpAddr::V4(*ip))
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_peer_gets_loopback() {
        assert_eq!(
            local_address_for(&IpAddr::V4(Ipv4Addr::LOCALHOST)),
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        );
    }

    #[test]
    fn lan_addresses_exclude_loopback() {
        assert!(lan_ipv4_addresses().iter().all(|ip| !ip.is_loopback()));
    }
}
