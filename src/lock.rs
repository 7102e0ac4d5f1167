//! Single-writer guard for a capacity log directory.

use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

pub const LOCK_FILE_NAME: &str = "capacity.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("'{}' is held by another writer", path.display())]
    Held { path: PathBuf },
    #[error("could not lock '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An exclusive advisory lock on `<dir>/capacity.lock`.
///
/// Only one guard per directory can exist across all processes. The lock is
/// released when the guard is dropped, and by the OS if the process dies.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        match file.try_lock() {
            Ok(()) => {
                debug!(path = %path.display(), "Acquired writer lock");
                Ok(Self { file, path })
            }
            Err(TryLockError::WouldBlock) => Err(LockError::Held { path }),
            Err(TryLockError::Error(source)) => Err(LockError::Io { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "Failed to release writer lock");
        }
    }
}
