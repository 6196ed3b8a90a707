//! Exclusive locks on shared source caches.

use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An exclusive lock on the cache entry of one source.
///
/// Several processes (e.g. cluster nodes sharing a cache directory) may try
/// to update the same cached repository; the lock serializes them. The lock
/// is not reentrant: acquiring it twice from the same thread blocks forever.
/// It is released on drop.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    fn lock_path(cache_dir: &Path, local: &str) -> PathBuf {
        cache_dir.join(format!("{local}.lock"))
    }

    fn open(cache_dir: &Path, local: &str) -> io::Result<(File, PathBuf)> {
        std::fs::create_dir_all(cache_dir)?;
        let path = Self::lock_path(cache_dir, local);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        Ok((file, path))
    }

    /// Take the lock for `local` in `cache_dir`, blocking until it is free.
    pub fn acquire(cache_dir: &Path, local: &str) -> io::Result<Self> {
        if let Some(lock) = Self::try_acquire(cache_dir, local)? {
            return Ok(lock);
        }

        let (file, path) = Self::open(cache_dir, local)?;
        debug!(lock = %path.display(), "Waiting for cache lock");
        file.lock()?;
        Ok(Self { file, path })
    }

    /// Take the lock if nobody else holds it.
    pub fn try_acquire(cache_dir: &Path, local: &str) -> io::Result<Option<Self>> {
        let (file, path) = Self::open(cache_dir, local)?;
        match file.try_lock() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(e)) => Err(e),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!(lock = %self.path.display(), error = %e, "Failed to release cache lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let held = CacheLock::acquire(dir.path(), "repo.git").unwrap();
        assert!(held.path().ends_with("repo.git.lock"));

        assert!(CacheLock::try_acquire(dir.path(), "repo.git").unwrap().is_none());
        // Other sources are independent.
        assert!(CacheLock::try_acquire(dir.path(), "other.git").unwrap().is_some());

        drop(held);
        assert!(CacheLock::try_acquire(dir.path(), "repo.git").unwrap().is_some());
    }
}
