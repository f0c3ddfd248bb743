// # Private File Helpers
//
// Atomic, owner-only writes shared by every file access persists.
//
// - Write to `<name>.tmp` created with mode 0600, fsync, then rename over
//   the target. A crash leaves either the old or the new file, never a
//   truncated one.
// - Optionally copy the previous file to `<name>.backup` before the rename
//   so a corrupted file can be recovered on the next load.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;

/// Read a file, `Ok(None)` if it does not exist
pub async fn read_optional(path: &Path) -> Result<Option<String>, Error> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::state_store(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Atomically replace `path` with `contents`, readable by the owner only
pub async fn write_private(path: &Path, contents: &[u8]) -> Result<(), Error> {
    write_atomic(path, contents, false).await
}

/// Like [`write_private`], keeping the previous contents in `.backup`
pub async fn write_private_with_backup(path: &Path, contents: &[u8]) -> Result<(), Error> {
    write_atomic(path, contents, true).await
}

async fn write_atomic(path: &Path, contents: &[u8], backup: bool) -> Result<(), Error> {
    ensure_parent(path).await?;

    let temp = temp_path(path);
    // A stale temp file would keep its old mode
    let _ = fs::remove_file(&temp).await;

    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&temp).await.map_err(|e| {
            Error::state_store(format!("failed to create {}: {}", temp.display(), e))
        })?;
        file.write_all(contents).await.map_err(|e| {
            Error::state_store(format!("failed to write {}: {}", temp.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            Error::state_store(format!("failed to sync {}: {}", temp.display(), e))
        })?;
    }

    if backup && fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = fs::copy(path, backup_path(path)).await {
            tracing::warn!("failed to back up {}: {}", path.display(), e);
        }
    }

    fs::rename(&temp, path).await.map_err(|e| {
        Error::state_store(format!(
            "failed to rename {} to {}: {}",
            temp.display(),
            path.display(),
            e
        ))
    })?;

    tracing::trace!("wrote {}", path.display());
    Ok(())
}

async fn ensure_parent(path: &Path) -> Result<(), Error> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || fs::try_exists(parent).await.unwrap_or(false) {
        return Ok(());
    }

    fs::create_dir_all(parent).await.map_err(|e| {
        Error::config(format!(
            "failed to create directory {}: {}",
            parent.display(),
            e
        ))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).await;
    }
    Ok(())
}

/// Load JSON from `path`, falling back to its `.backup` when corrupted
///
/// A missing file is `Ok(None)`. A corrupted file with no usable backup is
/// also `Ok(None)`: losing cached state only costs one extra publish.
pub async fn load_json_with_recovery<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, Error> {
    let Some(content) = read_optional(path).await? else {
        tracing::debug!("{} does not exist", path.display());
        return Ok(None);
    };

    let parse_error = match serde_json::from_str::<T>(&content) {
        Ok(value) => return Ok(Some(value)),
        Err(e) => e,
    };

    tracing::warn!(
        "{} appears corrupted: {}. Attempting recovery from backup.",
        path.display(),
        parse_error
    );

    let backup = backup_path(path);
    let Some(backup_content) = read_optional(&backup).await? else {
        tracing::warn!("no backup for {}; starting empty", path.display());
        return Ok(None);
    };

    match serde_json::from_str::<T>(&backup_content) {
        Ok(value) => {
            if let Err(e) = fs::copy(&backup, path).await {
                tracing::error!("failed to restore {} from backup: {}", path.display(), e);
            } else {
                tracing::info!("restored {} from backup", path.display());
            }
            Ok(Some(value))
        }
        Err(e) => {
            tracing::error!("backup {} also corrupted: {}", backup.display(), e);
            Ok(None)
        }
    }
}

/// `<path>.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    sibling(path, "tmp")
}

/// `<path>.backup`
pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, "backup")
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
