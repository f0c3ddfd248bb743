// # IP Source Trait
//
// Defines the interface for determining the host's current address.
//
// ## Implementations
//
// - Interface enumeration: `access-ip-iface` crate
// - HTTP echo service (hosts behind NAT): `access-ip-http` crate
//
// Sources are composed by [`crate::address::AddressResolver`], which asks
// each in turn and stops at the first usable answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// IP version (v4 or v6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Whether `ip` belongs to this family
    pub fn matches(&self, ip: &IpAddr) -> bool {
        match self {
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
        }
    }

    /// Family of `ip`
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => f.write_str("ipv4"),
            IpVersion::V6 => f.write_str("ipv6"),
        }
    }
}

/// Trait for IP source implementations
///
/// # Contract
///
/// - `Ok(None)` means "no qualifying address right now". It is not an error;
///   callers try again on a later cycle.
/// - `Err` is reserved for local faults (unreadable interface table, HTTP
///   client failure) that a caller may want to log.
/// - Every call is time-bounded.
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Best current address of `family`, or of either family when `None`
    async fn current(&self, family: Option<IpVersion>) -> Result<Option<IpAddr>, crate::Error>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}
