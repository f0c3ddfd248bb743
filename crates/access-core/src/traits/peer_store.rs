// # Peer Store Trait
//
// Persistence for this host's own slot registration. Exactly one
// registration exists per running peer; it is overwritten on every
// registration, migration or heartbeat and never shared with other peers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// This peer's claimed slot, as last published
///
/// Serialized with the field names of the on-disk peer state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRegistration {
    /// Slot number
    #[serde(rename = "peer_slot")]
    pub slot: u32,
    /// Host token, `{prefix}{slot}`
    #[serde(rename = "peer_host")]
    pub hostname: String,
    /// `{hostname}.{domain}`
    #[serde(rename = "full_domain")]
    pub fqdn: String,
    /// Published address
    #[serde(rename = "public_ip")]
    pub address: IpAddr,
    /// When this slot was claimed
    pub registered_at: DateTime<Utc>,
    /// Last time a monitor cycle confirmed the registration
    pub last_heartbeat: DateTime<Utc>,
}

impl PeerRegistration {
    /// A fresh registration claimed now
    pub fn claimed(slot: u32, hostname: String, domain: &str, address: IpAddr) -> Self {
        let now = Utc::now();
        Self {
            slot,
            fqdn: format!("{}.{}", hostname, domain),
            hostname,
            address,
            registered_at: now,
            last_heartbeat: now,
        }
    }

    /// Refresh the heartbeat timestamp in place
    pub fn touch(&mut self) {
        self.last_heartbeat = Utc::now();
    }
}

/// Storage for the local [`PeerRegistration`]
#[async_trait]
pub trait PeerStore: Send + Sync {
    /// Load the registration, if one was ever saved
    async fn load(&self) -> Result<Option<PeerRegistration>, crate::Error>;

    /// Overwrite the registration
    async fn save(&self, registration: &PeerRegistration) -> Result<(), crate::Error>;
}
