//! Core traits for access
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsProvider`]: Upsert DNS records via vendor APIs
//! - [`IpSource`]: Determine the host's current address
//! - [`StateStore`]: Per-record sync state for idempotency and debouncing
//! - [`PeerStore`]: This peer's slot registration
//! - [`SlotProbe`]: Liveness oracle for slot hostnames

pub mod dns_provider;
pub mod ip_source;
pub mod peer_store;
pub mod slot_probe;
pub mod state_store;

pub use dns_provider::{
    Capabilities, ConfigField, DnsProvider, DnsProviderFactory, FieldKind, ProviderInfo,
    UpdateResult,
};
pub use ip_source::{IpSource, IpVersion};
pub use peer_store::{PeerRegistration, PeerStore};
pub use slot_probe::{SlotProbe, SlotStatus};
pub use state_store::{StateStore, SyncState};
