//! Keyed async locks for serializing operations per upload id or digest.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A map of named async locks.
///
/// State transitions for one upload id (or commits for one digest) must be
/// serialized so that racing callers see each other's results instead of
/// both passing the same check. Locks are created on first use; entries
/// with no guard outstanding are pruned on the next acquisition, so the map
/// stays bounded by the set of keys currently in flight.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a key, waiting if another task holds it.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            // A strong count of 1 means only the map holds the lock: no
            // guard is alive and no waiter holds a clone.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked_keys(&self) -> usize {
        self.locks.lock().await.len()
    }
}
