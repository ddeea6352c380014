// System utilities: local interface enumeration/classification, CIDR
// containment (reusing utils::ip_range_check), hostname caching, and a
// deterministic PRNG. Interface enumeration uses `nix::ifaddrs`'s safe
// `getifaddrs` wrapper rather than hand-written FFI, the same crate and
// approach `webrtc-rs`'s `util` crate reaches for on Unix.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use crate::error::{Error, Result};

pub use crate::utils::IpRangeConfig;

mod rng;
pub use rng::DeterministicRng;

/// Reachability class of a configured or discovered IP address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpClassification {
    Loopback,
    LinkLocal,
    PrivateUse,
    Multicast,
    /// Anything not covered by the categories above: assumed to be
    /// publicly routable.
    InternetReachable,
}

/// Classifies a single address. IPv4-mapped IPv6 addresses are
/// unwrapped and classified as their IPv4 form first.
pub fn classify_ip(ip: &IpAddr) -> IpClassification {
    match ip {
        IpAddr::V4(v4) => classify_ipv4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4() {
                classify_ipv4(&mapped)
            } else {
                classify_ipv6(v6)
            }
        }
    }
}

fn classify_ipv4(ip: &Ipv4Addr) -> IpClassification {
    if ip.is_loopback() {
        IpClassification::Loopback
    } else if ip.is_link_local() {
        IpClassification::LinkLocal
    } else if ip.is_multicast() {
        IpClassification::Multicast
    } else if ip.is_private() {
        IpClassification::PrivateUse
    } else {
        IpClassification::InternetReachable
    }
}

fn classify_ipv6(ip: &Ipv6Addr) -> IpClassification {
    if ip.is_loopback() {
        IpClassification::Loopback
    } else if is_unicast_link_local(ip) {
        IpClassification::LinkLocal
    } else if ip.is_multicast() {
        IpClassification::Multicast
    } else if is_unique_local(ip) {
        IpClassification::PrivateUse
    } else {
        IpClassification::InternetReachable
    }
}

/// fe80::/10
fn is_unicast_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// fc00::/7 (ULA)
fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

/// One discovered local interface address.
#[derive(Debug, Clone)]
pub struct NetworkInterface {
    pub name: String,
    pub address: IpAddr,
    pub classification: IpClassification,
}

/// Enumerates addresses of local interfaces: IPv4 first, then IPv6,
/// loopback addresses sorted last within each family.
pub fn enumerate_interfaces() -> Result<Vec<NetworkInterface>> {
    let addrs = nix::ifaddrs::getifaddrs()
        .map_err(|e| Error::with_cause(crate::error::ErrorKind::Resource, "getifaddrs failed", e))?;

    let mut interfaces: Vec<NetworkInterface> = Vec::new();

    for ifaddr in addrs {
        let Some(address) = ifaddr.address else {
            continue;
        };

        let ip = if let Some(v4) = address.as_sockaddr_in() {
            IpAddr::V4(Ipv4Addr::from(v4.ip()))
        } else if let Some(v6) = address.as_sockaddr_in6() {
            IpAddr::V6(v6.ip())
        } else {
            continue;
        };

        interfaces.push(NetworkInterface {
            name: ifaddr.interface_name,
            classification: classify_ip(&ip),
            address: ip,
        });
    }

    interfaces.sort_by_key(|iface| {
        let family_rank = match iface.address {
            IpAddr::V4(_) => 0,
            IpAddr::V6(_) => 1,
        };
        let loopback_rank = (iface.classification == IpClassification::Loopback) as u8;
        (family_rank, loopback_rank)
    });

    Ok(interfaces)
}

static HOSTNAME_CACHE: OnceLock<String> = OnceLock::new();

/// Returns the machine hostname, resolved once per process and cached.
pub fn cached_hostname() -> Result<&'static str> {
    if let Some(cached) = HOSTNAME_CACHE.get() {
        return Ok(cached.as_str());
    }

    let mut buf = [0u8; 256];
    let hostname = nix::unistd::gethostname(&mut buf)
        .map_err(|e| Error::with_cause(crate::error::ErrorKind::Resource, "gethostname failed", e))?
        .to_string_lossy()
        .into_owned();

    Ok(HOSTNAME_CACHE.get_or_init(|| hostname).as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_classify_ip_loopback_and_private() {
        assert_eq!(
            classify_ip(&IpAddr::V4(Ipv4Addr::from_str("127.0.0.1").unwrap())),
            IpClassification::Loopback
        );
        assert_eq!(
            classify_ip(&IpAddr::V4(Ipv4Addr::from_str("10.0.0.1").unwrap())),
            IpClassification::PrivateUse
        );
        assert_eq!(
            classify_ip(&IpAddr::V4(Ipv4Addr::from_str("8.8.8.8").unwrap())),
            IpClassification::InternetReachable
        );
    }

    #[test]
    fn test_classify_ip_v6_link_local_and_ula() {
        assert_eq!(
            classify_ip(&IpAddr::V6(Ipv6Addr::from_str("fe80::1").unwrap())),
            IpClassification::LinkLocal
        );
        assert_eq!(
            classify_ip(&IpAddr::V6(Ipv6Addr::from_str("fd00::1").unwrap())),
            IpClassification::PrivateUse
        );
        assert_eq!(
            classify_ip(&IpAddr::V6(Ipv6Addr::from_str("2001:db8::1").unwrap())),
            IpClassification::InternetReachable
        );
    }

    #[test]
    fn test_enumerate_interfaces_includes_loopback() {
        let interfaces = enumerate_interfaces().expect("getifaddrs should succeed in test sandbox");
        assert!(interfaces
            .iter()
            .any(|iface| iface.classification == IpClassification::Loopback));
    }

    #[test]
    fn test_cached_hostname_is_stable_across_calls() {
        let first = cached_hostname().unwrap().to_string();
        let second = cached_hostname().unwrap().to_string();
        assert_eq!(first, second);
    }
}
