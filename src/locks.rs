//! Per-content-id mutual exclusion.
//!
//! At most one detection per content id is in flight. Different ids never
//! contend: each id gets its own async mutex, created on demand and
//! dropped from the map once no caller holds it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Map of lazily created per-key async mutexes.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<i64, Weak<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Released when the guard drops.
    pub async fn lock(&self, key: i64) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            match slots.get(&key).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(AsyncMutex::new(()));
                    slots.insert(key, Arc::downgrade(&fresh));
                    slots.retain(|_, weak| weak.strong_count() > 0);
                    fresh
                }
            }
        };
        slot.lock_owned().await
    }

    /// Number of keys with a live mutex.
    pub fn live_keys(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|w| w.strong_count() > 0).count()
    }
}
