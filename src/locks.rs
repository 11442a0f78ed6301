//! Per-key mutual exclusion.
//!
//! Used to serialise turns of one conversation (key: `channel/user`) and
//! reindexes of one source document (key: source document id) while work
//! on different keys runs concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Releases the key when dropped.
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        KeyGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Forget keys nobody holds or waits on.
    pub async fn cleanup_unused(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}
