// # Memory Stores
//
// In-memory implementations of StateStore and PeerStore. Nothing survives a
// restart; the first sync after a restart always publishes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::peer_store::{PeerRegistration, PeerStore};
use crate::traits::state_store::{StateStore, SyncState};

/// In-memory sync state store
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HashMap<String, SyncState>>>,
}

impl MemoryStateStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, record_name: &str) -> Result<Option<SyncState>, Error> {
        Ok(self.inner.read().await.get(record_name).cloned())
    }

    async fn set(&self, record_name: &str, state: &SyncState) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .insert(record_name.to_string(), state.clone());
        Ok(())
    }
}

/// In-memory peer registration
#[derive(Debug, Clone, Default)]
pub struct MemoryPeerStore {
    inner: Arc<RwLock<Option<PeerRegistration>>>,
}

impl MemoryPeerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `registration`
    pub fn with(registration: PeerRegistration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(registration))),
        }
    }
}

#[async_trait]
impl PeerStore for MemoryPeerStore {
    async fn load(&self) -> Result<Option<PeerRegistration>, Error> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, registration: &PeerRegistration) -> Result<(), Error> {
        *self.inner.write().await = Some(registration.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty().await);

        let ip: IpAddr = "203.0.113.4".parse().unwrap();
        store.set("example.com", &SyncState::confirmed(ip)).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get("example.com").await.unwrap().map(|s| s.last_known_address),
            Some(ip)
        );
    }

    #[test]
    fn test_memory_state_store_missing_key() {
        let store = MemoryStateStore::new();
        let state = tokio_test::assert_ok!(tokio_test::block_on(store.get("example.com")));
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_memory_peer_store_overwrites() {
        let store = MemoryPeerStore::new();
        assert!(store.load().await.unwrap().is_none());

        let ip: IpAddr = "203.0.113.4".parse().unwrap();
        let first = PeerRegistration::claimed(4, "peer4".into(), "example.com", ip);
        let second = PeerRegistration::claimed(1, "peer1".into(), "example.com", ip);
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        assert_eq!(store.load().await.unwrap().map(|r| r.slot), Some(1));
    }
}
