//! Per-upload lock acquisition

use tracing::{debug, warn};
use tusk_core::{Lock, Result};

use crate::Handler;

/// Held lock on one upload, released when dropped
pub(crate) struct LockGuard {
    id: String,
    lock: Box<dyn Lock>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match self.lock.unlock() {
            Ok(()) => debug!(id = %self.id, "upload unlocked"),
            Err(e) => warn!(id = %self.id, error = %e, "failed to release upload lock"),
        }
    }
}

impl Handler {
    /// Acquire the lock for `id`. Returns `None` when no locker is
    /// configured, in which case the engine provides no mutual exclusion.
    pub(crate) fn lock_upload(&self, id: &str) -> Result<Option<LockGuard>> {
        let Some(locker) = &self.composer.locker else {
            return Ok(None);
        };

        let mut lock = locker.new_lock(id)?;
        lock.lock()?;
        debug!(id = %id, "upload locked");

        Ok(Some(LockGuard {
            id: id.to_string(),
            lock,
        }))
    }
}
