//! Cross-process locks around layer creation.
//!
//! Allocating a layer directory must not interleave with another process
//! doing the same for the same store; that is the store-wide
//! `<store>/create.lock`. Unpacking a layer additionally holds
//! `<store>/locks/<layer_id>.lock` from the existence check until the size
//! marker is written. Both are exclusive `flock`s, which belong to the open
//! file description, so two handles in one process exclude each other too.

use std::fs::{File, OpenOptions};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use rustix::fs::{flock, FlockOperation};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// File name of the creation lock inside the store directory.
pub const LOCK_FILE: &str = "create.lock";

/// Held exclusive lock; released on drop.
#[derive(Debug)]
pub struct CreateLock {
    file: File,
    path: PathBuf,
}

impl CreateLock {
    /// Block until the exclusive lock at `path` is held.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        flock(file.as_fd(), FlockOperation::LockExclusive)
            .map_err(|e| Error::backend(format!("lock {}", path.display()), e))?;
        debug!(path = %path.display(), "create lock acquired");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Take the lock only if nobody else holds it.
    #[cfg(test)]
    pub(crate) fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive) {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(rustix::io::Errno::AGAIN) => Ok(None),
            Err(e) => Err(Error::backend(format!("lock {}", path.display()), e)),
        }
    }
}

impl Drop for CreateLock {
    fn drop(&mut self) {
        if let Err(e) = flock(self.file.as_fd(), FlockOperation::Unlock) {
            warn!(path = %self.path.display(), error = %e, "failed to release create lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(LOCK_FILE);

        let held = CreateLock::acquire(&path).unwrap();
        assert!(CreateLock::try_acquire(&path).unwrap().is_none());

        drop(held);
        assert!(CreateLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn acquire_creates_missing_store() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("store").join(LOCK_FILE);
        let _lock = CreateLock::acquire(&path).unwrap();
        assert!(path.exists());
    }
}
