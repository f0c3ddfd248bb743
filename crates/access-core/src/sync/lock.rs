// # Sync Run-Lock
//
// Advisory exclusive lock on one path, so that at most one sync attempt
// per host reaches a backend at a time. The lock is non-blocking: a second
// attempt observes "busy" instead of queueing. Release is tied to the
// guard's lifetime, so every exit path (including panics and `?`) unlocks.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::Error;

/// Lock file location
#[derive(Debug, Clone)]
pub struct RunLock {
    path: PathBuf,
}

/// Held lock; dropping it releases the lock
#[derive(Debug)]
pub struct RunLockGuard {
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// Lock on `path`; the file is created on first use
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock without waiting
    ///
    /// `Ok(None)` when another holder has it.
    pub fn try_acquire(&self) -> Result<Option<RunLockGuard>, Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.lock_file()
    }

    #[cfg(unix)]
    fn lock_file(&self) -> Result<Option<RunLockGuard>, Error> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};
        use std::os::unix::fs::OpenOptionsExt;

        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .mode(0o600)
            .open(&self.path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                tracing::trace!("acquired {}", self.path.display());
                Ok(Some(RunLockGuard {
                    _lock: lock,
                    path: self.path.clone(),
                }))
            }
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
            Err((_, errno)) => Err(Error::Io(std::io::Error::from(errno))),
        }
    }

    // Without flock, exclusive creation of the lock file stands in for it
    #[cfg(not(unix))]
    fn lock_file(&self) -> Result<Option<RunLockGuard>, Error> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => Ok(Some(RunLockGuard {
                _file: file,
                path: self.path.clone(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        #[cfg(not(unix))]
        let _ = std::fs::remove_file(&self.path);
        tracing::trace!("released {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempdir().unwrap();
        let lock = RunLock::new(dir.path().join("sync.lock"));
        let other = RunLock::new(dir.path().join("sync.lock"));

        let guard = lock.try_acquire().unwrap();
        assert!(guard.is_some());
        assert!(other.try_acquire().unwrap().is_none());

        drop(guard);
        assert!(other.try_acquire().unwrap().is_some());
    }
}
