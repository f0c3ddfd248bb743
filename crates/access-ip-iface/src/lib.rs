// # Interface IP Source
//
// Reads the addresses configured on local interfaces and hands them to the
// core selection policy (`access_core::select_address`).
//
// ## Platform Support
//
// - Unix: `getifaddrs(3)` via `nix` for every address on interfaces that
//   are up.
// - Linux: IPv6 entries come from `/proc/net/if_inet6` instead, which also
//   carries the kernel address flags. Temporary (privacy extension)
//   addresses are marked; deprecated, tentative and DAD-failed addresses
//   are skipped.
// - Elsewhere the source always reports no address, leaving the HTTP
//   source to answer.

use access_core::address::{AddressScope, InterfaceAddress, select_address};
use access_core::traits::{IpSource, IpVersion};
use access_core::{Error, Result};
use std::net::{IpAddr, Ipv6Addr};

/// IFA_F_TEMPORARY
const IFA_F_TEMPORARY: u32 = 0x01;
/// IFA_F_DADFAILED
const IFA_F_DADFAILED: u32 = 0x08;
/// IFA_F_DEPRECATED
const IFA_F_DEPRECATED: u32 = 0x20;
/// IFA_F_TENTATIVE
const IFA_F_TENTATIVE: u32 = 0x40;

#[cfg(target_os = "linux")]
const IF_INET6_PATH: &str = "/proc/net/if_inet6";

/// IP source backed by local interface addresses
#[derive(Debug, Clone, Default)]
pub struct InterfaceIpSource {
    interface: Option<String>,
}

impl InterfaceIpSource {
    /// Consider every interface
    pub fn new() -> Self {
        Self::default()
    }

    /// Consider only `interface`
    pub fn for_interface(interface: impl Into<String>) -> Self {
        Self {
            interface: Some(interface.into()),
        }
    }

    /// Every usable address on the selected interfaces
    pub async fn addresses(&self) -> Result<Vec<InterfaceAddress>> {
        let mut found = enumerate().await?;
        if let Some(name) = &self.interface {
            found.retain(|a| &a.interface == name);
        }
        Ok(found)
    }
}

#[async_trait::async_trait]
impl IpSource for InterfaceIpSource {
    async fn current(&self, family: Option<IpVersion>) -> Result<Option<IpAddr>> {
        let candidates = self.addresses().await?;
        tracing::trace!("interface addresses: {:?}", candidates);
        Ok(select_address(&candidates, family))
    }

    fn name(&self) -> &'static str {
        "interface"
    }
}

#[cfg(unix)]
async fn enumerate() -> Result<Vec<InterfaceAddress>> {
    let (mut found, up) = tokio::task::spawn_blocking(getifaddrs_up)
        .await
        .map_err(|e| Error::Other(format!("interface enumeration task failed: {}", e)))??;

    #[cfg(target_os = "linux")]
    {
        match tokio::fs::read_to_string(IF_INET6_PATH).await {
            Ok(content) => {
                // Replace getifaddrs' IPv6 view with the flag-aware one
                found.retain(|a| a.ip.is_ipv4());
                found.extend(
                    parse_if_inet6(&content)
                        .into_iter()
                        .filter(|a| up.contains(&a.interface)),
                );
            }
            Err(e) => {
                tracing::debug!("{} unavailable: {}", IF_INET6_PATH, e);
            }
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = &up;

    Ok(found)
}

#[cfg(not(unix))]
async fn enumerate() -> Result<Vec<InterfaceAddress>> {
    Ok(Vec::new())
}

/// Addresses on interfaces that are up, and the names of those interfaces
#[cfg(unix)]
fn getifaddrs_up() -> Result<(Vec<InterfaceAddress>, Vec<String>)> {
    use nix::net::if_::InterfaceFlags;

    let ifaddrs = nix::ifaddrs::getifaddrs()
        .map_err(|e| Error::Io(std::io::Error::from(e)))?;

    let mut found = Vec::new();
    let mut up: Vec<String> = Vec::new();
    for ifaddr in ifaddrs {
        if !ifaddr.flags.contains(InterfaceFlags::IFF_UP) {
            continue;
        }
        if !up.contains(&ifaddr.interface_name) {
            up.push(ifaddr.interface_name.clone());
        }

        let Some(storage) = ifaddr.address else {
            continue;
        };
        let ip = if let Some(v4) = storage.as_sockaddr_in() {
            IpAddr::V4(std::net::Ipv4Addr::from(v4.ip()))
        } else if let Some(v6) = storage.as_sockaddr_in6() {
            IpAddr::V6(v6.ip())
        } else {
            continue;
        };
        found.push(InterfaceAddress::new(ip, ifaddr.interface_name.clone()));
    }
    Ok((found, up))
}

/// Parse `/proc/net/if_inet6`
///
/// Each line: address (32 hex digits), ifindex, prefix length, scope,
/// flags, interface name. Malformed lines are skipped.
pub fn parse_if_inet6(content: &str) -> Vec<InterfaceAddress> {
    content
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return None;
            }
            let raw = u128::from_str_radix(fields[0], 16).ok()?;
            let flags = u32::from_str_radix(fields[4], 16).ok()?;
            if flags & (IFA_F_DADFAILED | IFA_F_DEPRECATED | IFA_F_TENTATIVE) != 0 {
                return None;
            }

            let ip = IpAddr::V6(Ipv6Addr::from(raw));
            let mut address = InterfaceAddress::new(ip, fields[5]);
            if flags & IFA_F_TEMPORARY != 0 {
                address = address.temporary();
            }
            Some(address)
        })
        .filter(|a| a.scope != AddressScope::Loopback)
        .collect()
}
