// # Slot Probe Trait
//
// The liveness oracle consulted by the discovery engine. Occupancy is never
// cached: every decision is a fresh read over DNS.

use async_trait::async_trait;
use std::net::IpAddr;

/// Classification of one candidate hostname
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    /// The name does not resolve
    Free,
    /// The name resolves, or its state could not be determined
    Occupied {
        /// Addresses the name resolved to (empty when inconclusive)
        addresses: Vec<IpAddr>,
        /// Outcome of the reachability check, `None` when not determined
        reachable: Option<bool>,
    },
}

impl SlotStatus {
    /// Occupied with nothing known about the holder
    pub fn inconclusive() -> Self {
        SlotStatus::Occupied {
            addresses: Vec::new(),
            reachable: None,
        }
    }

    /// Whether the name does not resolve
    pub fn is_free(&self) -> bool {
        matches!(self, SlotStatus::Free)
    }

    /// Whether the name resolves to `addr` and nothing else
    ///
    /// Another peer behind the same NAT publishes the same address, so this
    /// alone never proves the record is ours.
    pub fn held_only_by(&self, addr: IpAddr) -> bool {
        match self {
            SlotStatus::Free => false,
            SlotStatus::Occupied { addresses, .. } => {
                !addresses.is_empty() && addresses.iter().all(|a| *a == addr)
            }
        }
    }

    /// Whether the name resolves to someone other than `self_addr`
    pub fn held_by_other(&self, self_addr: IpAddr) -> bool {
        match self {
            SlotStatus::Free => false,
            SlotStatus::Occupied { addresses, .. } => {
                !addresses.is_empty() && !addresses.contains(&self_addr)
            }
        }
    }
}

/// Liveness oracle for slot hostnames
///
/// Implementations never fail: anything they cannot decide is reported as
/// occupied, because double-claiming a slot costs more than skipping one.
#[async_trait]
pub trait SlotProbe: Send + Sync {
    /// Classify `fqdn`
    async fn probe(&self, fqdn: &str) -> SlotStatus;
}
