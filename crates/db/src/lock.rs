//! Single-writer lock for the store file.
//!
//! Two daemons sharing one database would corrupt the lifecycle
//! invariants, so startup takes an exclusive `flock` on a sidecar lock
//! file and fails fast if another process already holds it. The lock is
//! released by the kernel when the daemon exits, crashed or not.

use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Store at {0} is locked by another daemon process")]
    AlreadyHeld(PathBuf),

    #[error("Failed to open lock file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Exclusive advisory lock guarding a store file. Held for the lifetime
/// of the value; dropping it (or process exit) releases the lock.
pub struct StoreLock {
    // Kept only for the open file descriptor backing the flock.
    _file: std::fs::File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock for the store at `db_path` (lock file is
    /// `<db_path>.lock`). Non-blocking: returns `AlreadyHeld` at once
    /// when another process owns it.
    pub fn acquire(db_path: &Path) -> Result<Self, LockError> {
        let path = db_path.with_extension("lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            return if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(LockError::AlreadyHeld(path))
            } else {
                Err(LockError::Io { path, source: err })
            };
        }

        tracing::debug!(path = %path.display(), "Acquired store lock");
        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_acquired_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("jobs.db");

        let lock = StoreLock::acquire(&db).expect("first acquire should succeed");
        drop(lock);

        // After release the lock can be taken again from this process.
        StoreLock::acquire(&db).expect("re-acquire after drop should succeed");
    }

    #[test]
    fn lock_file_sits_next_to_db() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("jobs.db");
        let lock = StoreLock::acquire(&db).unwrap();
        assert_eq!(lock.path(), dir.path().join("jobs.lock"));
    }
}
