//! Single-instance guard.
//!
//! Only one engine process may run a session against the hosts file at a
//! time. The guard is an exclusive advisory lock on a file in the data
//! directory, released when the guard is dropped or the process dies.

use crate::AppError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use tracing::debug;

pub struct InstanceLock {
    file: File,
}

impl InstanceLock {
    pub fn acquire(path: &Path) -> Result<Self, AppError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| {
            AppError::Lock(format!(
                "another focus session is already running (lock held on {})",
                path.display()
            ))
        })?;

        debug!(path = %path.display(), "instance lock acquired");
        Ok(Self { file })
    }

    /// True when some process currently holds the lock at `path`.
    pub fn is_held(path: &Path) -> bool {
        let Ok(file) = OpenOptions::new().read(true).open(path) else {
            return false;
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
