use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::models::SlotKey;

/// One async mutex per slot. Holding the guard serialises count-then-insert
/// for that slot; other slots are unaffected.
#[derive(Default)]
pub struct SlotLockRegistry {
    locks: Mutex<HashMap<SlotKey, Weak<Mutex<()>>>>,
}

impl SlotLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: SlotKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries whose last guard was dropped are dead.
            locks.retain(|_, lock| lock.strong_count() > 0);

            match locks.get(&key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    locks.insert(key, Arc::downgrade(&lock));
                    lock
                }
            }
        };

        debug!("Waiting for slot lock: {}", key);
        lock.lock_owned().await
    }

    pub async fn tracked_slots(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}
