use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::lock_api::{ArcMutexGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawMutex, RawRwLock, RwLock};

use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::LogicalPath;

/// Per-logical-path mutual exclusion used while files are staged for a version. A new
/// locker is created for every mutation; it is not a cross-process lock. Its job is to
/// prevent two threads within the same update from writing the same logical path.
pub struct FileLocker {
    timeout: Duration,
    locks: Mutex<HashMap<LogicalPath, Arc<Mutex<()>>>>,
}

/// Releases the held lock on drop
pub struct FileLockGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

/// Maps object IDs to reader/writer locks. Writer locks are held only across the final
/// install step of a mutation so that update closures do not serialize on each other.
pub struct ObjectLockManager {
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

/// Releases the held writer lock on drop
pub struct ObjectWriteGuard {
    _guard: ArcRwLockWriteGuard<RawRwLock, ()>,
}

impl FileLocker {
    /// Creates a new locker. A zero timeout means lock acquisition is attempted exactly
    /// once and fails immediately if the lock is held.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the lock for the specified logical path, blocking up to the configured
    /// timeout. Fails with `OcflError::LockTimeout` if the lock cannot be acquired.
    pub fn lock(&self, path: &LogicalPath) -> Result<FileLockGuard> {
        let lock = self.entry(path);

        let guard = if self.timeout.is_zero() {
            lock.try_lock_arc()
        } else {
            lock.try_lock_arc_for(self.timeout)
        };

        match guard {
            Some(guard) => Ok(FileLockGuard { _guard: guard }),
            None => Err(OcflError::LockTimeout(path.to_string())),
        }
    }

    /// Acquires the lock for the specified logical path, runs the operation, and releases
    /// the lock on all exit paths.
    pub fn with_lock<T>(
        &self,
        path: &LogicalPath,
        op: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock(path)?;
        op()
    }

    fn entry(&self, path: &LogicalPath) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(path.clone()).or_default().clone()
    }
}

impl ObjectLockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks until the writer lock for the object is acquired
    pub fn write(&self, object_id: &str) -> ObjectWriteGuard {
        let lock = {
            let mut locks = self.locks.lock();
            locks.entry(object_id.to_string()).or_default().clone()
        };

        ObjectWriteGuard {
            _guard: lock.write_arc(),
        }
    }
}

impl Default for ObjectLockManager {
    fn default() -> Self {
        Self::new()
    }
}
