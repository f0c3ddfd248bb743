//! Public address selection
//!
//! Interface enumeration lives in `access-ip-iface`; this module holds the
//! pure policy deciding which enumerated address is worth publishing, and
//! the [`AddressResolver`] that tries a chain of [`IpSource`]s in order.
//!
//! Policy:
//! - loopback, link-local and private ranges are never published
//!   (RFC 1918, CGNAT `100.64.0.0/10`, ULA `fc00::/7`)
//! - a stable global address beats a temporary (privacy) one
//! - with no family requested, IPv6 is preferred over IPv4

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::traits::{IpSource, IpVersion};

/// Reachability class of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AddressScope {
    /// `127.0.0.0/8`, `::1`
    Loopback,
    /// `169.254.0.0/16`, `fe80::/10`
    LinkLocal,
    /// RFC 1918, CGNAT, ULA and other non-routable ranges
    Private,
    /// Globally routable
    Global,
}

impl AddressScope {
    /// Classify an address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => classify_v4(v4),
            IpAddr::V6(v6) => classify_v6(v6),
        }
    }
}

fn classify_v4(ip: &Ipv4Addr) -> AddressScope {
    let [a, b, ..] = ip.octets();
    if ip.is_loopback() {
        AddressScope::Loopback
    } else if ip.is_link_local() {
        AddressScope::LinkLocal
    } else if ip.is_private()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        // CGNAT 100.64.0.0/10
        || (a == 100 && (b & 0xc0) == 64)
        // 0.0.0.0/8
        || a == 0
        // 240.0.0.0/4
        || a >= 240
    {
        AddressScope::Private
    } else {
        AddressScope::Global
    }
}

fn classify_v6(ip: &Ipv6Addr) -> AddressScope {
    let first = ip.segments()[0];
    if ip.is_loopback() {
        AddressScope::Loopback
    } else if (first & 0xffc0) == 0xfe80 {
        AddressScope::LinkLocal
    } else if ip.is_unspecified()
        || ip.is_multicast()
        // ULA fc00::/7
        || (first & 0xfe00) == 0xfc00
        // Deprecated site-local fec0::/10
        || (first & 0xffc0) == 0xfec0
        // IPv4-mapped; the v4 side is enumerated separately
        || ip.to_ipv4_mapped().is_some()
    {
        AddressScope::Private
    } else {
        AddressScope::Global
    }
}

/// One address found on a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// The address
    pub ip: IpAddr,
    /// Its scope
    pub scope: AddressScope,
    /// IPv6 temporary (privacy extension) address
    pub temporary: bool,
    /// Interface name, e.g. `eth0`
    pub interface: String,
}

impl InterfaceAddress {
    /// A non-temporary address classified by [`AddressScope::of`]
    pub fn new(ip: IpAddr, interface: impl Into<String>) -> Self {
        Self {
            ip,
            scope: AddressScope::of(&ip),
            temporary: false,
            interface: interface.into(),
        }
    }

    /// Mark as temporary
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }
}

/// Pick the address to publish, if any
///
/// Ties keep enumeration order.
pub fn select_address(candidates: &[InterfaceAddress], family: Option<IpVersion>) -> Option<IpAddr> {
    let rank = |c: &InterfaceAddress| {
        let family_rank = match (family, c.ip) {
            (None, IpAddr::V6(_)) => 0,
            (None, IpAddr::V4(_)) => 1,
            (Some(_), _) => 0,
        };
        (family_rank, c.temporary)
    };

    candidates
        .iter()
        .filter(|c| c.scope == AddressScope::Global && AddressScope::of(&c.ip) == AddressScope::Global)
        .filter(|c| family.is_none_or(|f| f.matches(&c.ip)))
        .min_by_key(|c| rank(c))
        .map(|c| c.ip)
}

/// Tries each configured [`IpSource`] in order
///
/// The first source yielding a usable global address wins. Source errors
/// are logged and the next source is tried; the resolver fails with
/// `AddressUnavailable` only when every source came up empty.
#[derive(Clone)]
pub struct AddressResolver {
    sources: Vec<Arc<dyn IpSource>>,
}

impl AddressResolver {
    /// Resolver over `sources`, tried front to back
    pub fn new(sources: Vec<Arc<dyn IpSource>>) -> Self {
        Self { sources }
    }

    /// Names of the configured sources, in order
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Current public address of the requested family
    pub async fn resolve(&self, family: Option<IpVersion>) -> Result<IpAddr> {
        for source in &self.sources {
            match source.current(family).await {
                Ok(Some(ip)) if AddressScope::of(&ip) == AddressScope::Global => {
                    tracing::debug!("address {} from {}", ip, source.name());
                    return Ok(ip);
                }
                Ok(Some(ip)) => {
                    tracing::debug!("{} returned non-global address {}", source.name(), ip);
                }
                Ok(None) => {
                    tracing::debug!("{} found no address", source.name());
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}", source.name(), e);
                }
            }
        }

        let wanted = family.map(|f| f.to_string()).unwrap_or_else(|| "any".to_string());
        Err(Error::AddressUnavailable(format!(
            "no global {} address from [{}]",
            wanted,
            self.source_names().join(", ")
        )))
    }
}

impl std::fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressResolver")
            .field("sources", &self.source_names())
            .finish()
    }
}
