use fs2::FileExt;
use muninn_core::{MuninnError, Result};
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive write lock backed by a lock file.
/// Automatically released when dropped. Readers never take it; all
/// persisted records are immutable once appended.
pub struct StoreLock {
    _file: File,
}

impl StoreLock {
    /// Try to acquire the lock (non-blocking).
    /// Returns `Locked` if held by another process.
    pub fn acquire(lock_file: &Path) -> Result<Self> {
        if let Some(parent) = lock_file.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MuninnError::io("create dir", parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_file)
            .map_err(|e| MuninnError::io("open lock", lock_file, e))?;

        file.try_lock_exclusive()
            .map_err(|_| MuninnError::Locked(lock_file.display().to_string()))?;

        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let lock_path = tmp.path().join("LOCK");

        let lock = StoreLock::acquire(&lock_path).unwrap();
        // Second acquire should fail while first is held
        assert!(matches!(
            StoreLock::acquire(&lock_path),
            Err(MuninnError::Locked(_))
        ));
        drop(lock);
        // After drop, should succeed again
        let _lock2 = StoreLock::acquire(&lock_path).unwrap();
    }
}
