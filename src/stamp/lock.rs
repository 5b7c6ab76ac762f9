// src/stamp/lock.rs

//! Per-package build lock
//!
//! Two builds of the same package must never interleave their stamp writes.
//! Each package identity gets its own lock file next to its stamp directory,
//! so different packages can build in parallel.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive `flock` on a package's lock file, released on drop
pub struct PackageLock {
    /// The lock file handle (kept open to maintain lock)
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl PackageLock {
    /// Try to acquire the lock without blocking
    ///
    /// Returns `Ok(None)` if another process holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired build lock at {:?}", path);
                Ok(Some(Self { file, path }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Build lock already held at {:?}", path);
                Ok(None)
            }
            Err(e) => Err(Error::IoError(format!(
                "Failed to try-acquire build lock: {}",
                e
            ))),
        }
    }

    fn open(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(File::create(path)?)
    }
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        debug!("Released build lock at {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_same_package_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("zlib-1.3-r0.lock");

        let lock = PackageLock::try_acquire(&lock_path).unwrap().unwrap();
        assert!(PackageLock::try_acquire(&lock_path).unwrap().is_none());

        drop(lock);
        assert!(PackageLock::try_acquire(&lock_path).unwrap().is_some());
    }

    #[test]
    fn test_different_packages_do_not_block() {
        let temp_dir = TempDir::new().unwrap();

        let _zlib = PackageLock::try_acquire(temp_dir.path().join("zlib-1.3-r0.lock"))
            .unwrap()
            .unwrap();
        let tk = PackageLock::try_acquire(temp_dir.path().join("tk-8.6.13-r0.lock")).unwrap();
        assert!(tk.is_some());
    }
}
