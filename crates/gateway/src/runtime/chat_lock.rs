//! Per-chat serialisation of welcome-record updates.
//!
//! Join events for the same chat must run their read-modify-write of the
//! active record one at a time; different chats proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use cb_domain::error::{Error, Result};

/// Each slot key maps to a `Semaphore(1)`. Holding the permit grants
/// exclusive access to that slot; it auto-releases on drop.
pub struct ChatLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for ChatLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until the slot is free and take it.
    pub async fn acquire(&self, key: &str) -> Result<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("chat lock {key} closed: {e}")))
    }

    /// Number of tracked slots; logged after each prune.
    pub fn slot_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop slots nobody holds or waits on.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        // Held permits and pending waiters each own a clone of the Arc.
        locks.retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}
