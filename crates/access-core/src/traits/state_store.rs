// # State Store Trait
//
// Persistent per-record sync state for the update coordinator.
//
// ## Purpose
//
// The state store makes the sync path idempotent and debounced by tracking:
// - The last address a provider confirmed for each record
// - When that confirmation happened
//
// ## Invariant
//
// State is written only after a provider confirms success. Failed and
// no-op runs leave it untouched, so `last_sync_timestamp` always means
// "time of the last successful publish".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// Sync state for one managed record
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyncState {
    /// Address last confirmed by the provider
    pub last_known_address: IpAddr,
    /// When the provider confirmed it
    pub last_sync_timestamp: DateTime<Utc>,
}

impl SyncState {
    /// State for an address confirmed now
    pub fn confirmed(address: IpAddr) -> Self {
        Self::confirmed_at(address, Utc::now())
    }

    /// State for an address confirmed at `at`
    pub fn confirmed_at(address: IpAddr, at: DateTime<Utc>) -> Self {
        Self {
            last_known_address: address,
            last_sync_timestamp: at,
        }
    }

    /// Whether the last sync happened less than `window` before `now`
    pub fn within(&self, window: chrono::Duration, now: DateTime<Utc>) -> bool {
        let elapsed = now.signed_duration_since(self.last_sync_timestamp);
        elapsed >= chrono::Duration::zero() && elapsed < window
    }
}

/// Trait for state store implementations
///
/// All methods must be safe to call concurrently from multiple tasks.
/// `set` returns only once the state is durable.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the sync state of a record (keyed by FQDN)
    async fn get(&self, record_name: &str) -> Result<Option<SyncState>, crate::Error>;

    /// Replace the sync state of a record
    async fn set(&self, record_name: &str, state: &SyncState) -> Result<(), crate::Error>;
}
