//! Advisory lock files for serializing writers of a shared directory.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::debug;

use crate::error::UtilError;

/// An exclusive advisory lock, released when dropped.
///
/// The lock is taken on an open file description, so it serializes threads of
/// one process as well as separate processes that lock the same path.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    // Held only to keep the lock alive; closing the file releases it.
    _file: File,
}

impl LockGuard {
    /// Block until an exclusive lock on `path` is acquired.
    ///
    /// The lock file and its parent directories are created if missing. The
    /// file is never deleted, so lockers always contend on the same inode.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or locked.
    pub fn acquire(path: &Path) -> Result<Self, UtilError> {
        if let Some(parent) = path.parent() {
            crate::fs::ensure_dir(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| UtilError::Lock {
                path: path.display().to_string(),
                source,
            })?;
        FileExt::lock_exclusive(&file).map_err(|source| UtilError::Lock {
            path: path.display().to_string(),
            source,
        })?;
        debug!(lock = %path.display(), "acquired");

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!(lock = %self.path.display(), "released");
    }
}
