//! Cross-process run lock.
//!
//! An exclusive advisory lock on a well-known file. Acquisition never
//! blocks: a second process sees the lock held and backs off.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use leadflow_shared::{LeadflowError, Result};

/// Held advisory lock. Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock at `path` without waiting.
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_acquire(path: &Path) -> Result<Option<RunLock>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LeadflowError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| LeadflowError::io(path, e))?;

        match file.try_lock() {
            Ok(()) => {
                debug!(path = %path.display(), "lock acquired");
                Ok(Some(RunLock {
                    file,
                    path: path.to_path_buf(),
                }))
            }
            Err(TryLockError::WouldBlock) => {
                debug!(path = %path.display(), "lock held elsewhere");
                Ok(None)
            }
            Err(TryLockError::Error(e)) => Err(LeadflowError::io(path, e)),
        }
    }

    /// Whether another holder has the lock at `path` right now.
    ///
    /// Lets a caller back off before touching anything else. The answer can
    /// be stale by the time it returns, so the real run still takes the lock.
    pub fn is_held(path: &Path) -> Result<bool> {
        Ok(Self::try_acquire(path)?.is_none())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        } else {
            debug!(path = %self.path.display(), "lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn lock_path() -> PathBuf {
        std::env::temp_dir().join(format!("lf_lock_{}.lock", Uuid::now_v7()))
    }

    #[test]
    fn second_acquire_backs_off() {
        let path = lock_path();
        let held = RunLock::try_acquire(&path).unwrap();
        assert!(held.is_some());
        assert!(RunLock::try_acquire(&path).unwrap().is_none());
    }

    #[test]
    fn drop_releases() {
        let path = lock_path();
        {
            let _lock = RunLock::try_acquire(&path).unwrap().unwrap();
        }
        let again = RunLock::try_acquire(&path).unwrap();
        assert!(again.is_some());
    }

    #[test]
    fn is_held_reports_without_keeping_the_lock() {
        let path = lock_path();
        assert!(!RunLock::is_held(&path).unwrap());
        // The check itself released the lock.
        let held = RunLock::try_acquire(&path).unwrap();
        assert!(held.is_some());
        assert!(RunLock::is_held(&path).unwrap());
        drop(held);
        assert!(!RunLock::is_held(&path).unwrap());
    }

    #[test]
    fn creates_missing_parent() {
        let dir = std::env::temp_dir().join(format!("lf_lockdir_{}", Uuid::now_v7()));
        let path = dir.join("nested").join("run.lock");
        assert!(RunLock::try_acquire(&path).unwrap().is_some());
        assert!(path.exists());
    }
}
