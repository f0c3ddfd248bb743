// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename via `state::fs`
// - Automatic backup: keeps `.backup` of the previous state
// - Recovery: falls back to the backup if the main file is corrupted
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "peer0.swarm.example.com": {
//       "last_known_address": "203.0.113.7",
//       "last_sync_timestamp": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::fs as state_fs;
use crate::Error;
use crate::traits::state_store::{StateStore, SyncState};

/// State file format version
const STATE_FILE_VERSION: &str = "1.0";

/// File-based sync state store
///
/// Every mutation is written through immediately; the file is owner-only.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    records: Arc<RwLock<BTreeMap<String, SyncState>>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    records: BTreeMap<String, SyncState>,
}

impl FileStateStore {
    /// Open the store at `path`, recovering from backup if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        let records = match state_fs::load_json_with_recovery::<StateFileFormat>(&path).await? {
            Some(file) => {
                if file.version != STATE_FILE_VERSION {
                    tracing::warn!(
                        "State file version mismatch: expected {}, got {}. Loading anyway.",
                        STATE_FILE_VERSION,
                        file.version
                    );
                }
                tracing::debug!("Loaded sync state: {} records", file.records.len());
                file.records
            }
            None => BTreeMap::new(),
        };

        Ok(Self {
            path,
            records: Arc::new(RwLock::new(records)),
        })
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_state(&self, records: &BTreeMap<String, SyncState>) -> Result<(), Error> {
        let file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            records: records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::state_store(format!("failed to serialize state: {}", e)))?;
        state_fs::write_private_with_backup(&self.path, json.as_bytes()).await
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, record_name: &str) -> Result<Option<SyncState>, Error> {
        Ok(self.records.read().await.get(record_name).cloned())
    }

    async fn set(&self, record_name: &str, state: &SyncState) -> Result<(), Error> {
        // Hold the write lock across the disk write so concurrent setters
        // cannot persist out of order
        let mut records = self.records.write().await;
        let mut next = records.clone();
        next.insert(record_name.to_string(), state.clone());
        self.write_state(&next).await?;
        *records = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::net::IpAddr;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync-state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        assert!(store.get("peer0.example.com").await.unwrap().is_none());

        let ip: IpAddr = "203.0.113.4".parse().unwrap();
        let state = SyncState::confirmed_at(ip, Utc::now());
        store.set("peer0.example.com", &state).await.unwrap();
        assert!(path.exists());

        let reopened = FileStateStore::new(&path).await.unwrap();
        assert_eq!(reopened.get("peer0.example.com").await.unwrap(), Some(state));
        assert_eq!(reopened.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync-state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        let ip1: IpAddr = "203.0.113.4".parse().unwrap();
        let ip2: IpAddr = "203.0.113.5".parse().unwrap();
        store.set("example.com", &SyncState::confirmed(ip1)).await.unwrap();
        store.set("example.com", &SyncState::confirmed(ip2)).await.unwrap();

        std::fs::write(&path, b"corrupted json data").unwrap();

        let recovered = FileStateStore::new(&path).await.unwrap();
        // The backup holds the state from before the last write
        assert_eq!(
            recovered.get("example.com").await.unwrap().map(|s| s.last_known_address),
            Some(ip1)
        );
    }
}
