// # access-core
//
// Core library for access: dynamic DNS with self-assigned peer slots.
//
// ## Architecture Overview
//
// - **DnsProvider / DnsProviderFactory**: vendor backends and their schema
// - **IpSource / AddressResolver**: the host's current public address
// - **ProviderRegistry**: name → backend factory
// - **UpdateCoordinator**: lock-protected, debounced "update if changed"
// - **PeerDiscovery**: slot scan, registration and self-healing over DNS
// - **StateStore / PeerStore**: local persistence (sync state, registration)
//
// DNS is the only shared medium between peers. Everything in this crate is
// library-first; the `access` binary in `accessd` only wires it together.

pub mod address;
pub mod config;
pub mod discovery;
pub mod error;
pub mod record;
pub mod registry;
pub mod state;
pub mod sync;
pub mod traits;
pub mod validation;

// Re-export core types for convenience
pub use address::{AddressResolver, AddressScope, InterfaceAddress, select_address};
pub use config::{ConfigPaths, DiscoveryConfig, DiscoveryTuning, ProviderCredentials, SyncSettings};
pub use discovery::{DnsLivenessProbe, MonitorOutcome, PeerDiscovery};
pub use error::{Error, Result};
pub use record::{RecordType, RecordUpdate};
pub use registry::ProviderRegistry;
pub use state::{FilePeerStore, FileStateStore, MemoryPeerStore, MemoryStateStore};
pub use sync::{RunLock, SyncOutcome, UpdateCoordinator};
pub use traits::{
    DnsProvider, DnsProviderFactory, IpSource, IpVersion, PeerRegistration, PeerStore, SlotProbe,
    SlotStatus, StateStore, SyncState, UpdateResult,
};
