// # File Peer Store
//
// Persists this peer's slot registration as `peer.json`, the same record
// `access status` prints.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::fs as state_fs;
use crate::Error;
use crate::traits::peer_store::{PeerRegistration, PeerStore};

/// File-backed [`PeerStore`]
#[derive(Debug, Clone)]
pub struct FilePeerStore {
    path: PathBuf,
}

impl FilePeerStore {
    /// Store at `path`; nothing is read until [`PeerStore::load`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the peer file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PeerStore for FilePeerStore {
    async fn load(&self) -> Result<Option<PeerRegistration>, Error> {
        state_fs::load_json_with_recovery(&self.path).await
    }

    async fn save(&self, registration: &PeerRegistration) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(registration)?;
        state_fs::write_private_with_backup(&self.path, json.as_bytes()).await
    }
}
