// # State Store Implementations
//
// File-backed and in-memory implementations of StateStore and PeerStore,
// plus the atomic owner-only write helpers they share.

pub mod file;
pub mod fs;
pub mod memory;
pub mod peer;

pub use file::FileStateStore;
pub use memory::{MemoryPeerStore, MemoryStateStore};
pub use peer::FilePeerStore;
