use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per key, created on demand.
///
/// The map lock is only held for lookups; waiting happens on the per-key lock,
/// so keys never contend with each other. A slot whose `Arc` is held only by
/// the map has no holder and no waiter, which is what makes pruning safe.
#[derive(Debug)]
pub struct KeyedLocks<T> {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<T>>>>,
}

impl<T> Default for KeyedLocks<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Default> KeyedLocks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, key: &str) -> Arc<AsyncMutex<T>> {
        self.slots
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(T::default())))
            .clone()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<T> {
        self.slot(key).lock_owned().await
    }

    /// Keep a slot if someone holds or awaits it, or if `keep` says so.
    /// Returns how many slots were dropped.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&str, &mut T) -> bool,
    {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(mut value) => keep(key, &mut value),
                Err(_) => true,
            }
        });
        before - slots.len()
    }

    /// Drop every slot nobody is using.
    pub fn prune_unused(&self) -> usize {
        self.retain(|_, _| false)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn held_slots_survive_pruning() {
        let locks: KeyedLocks<u32> = KeyedLocks::new();
        let guard = locks.lock("a").await;
        let _ = locks.lock("b").await;
        assert_eq!(locks.prune_unused(), 1);
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert_eq!(locks.prune_unused(), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn retain_sees_values() {
        let locks: KeyedLocks<u32> = KeyedLocks::new();
        *locks.lock("keep").await = 1;
        *locks.lock("drop").await = 0;
        assert_eq!(locks.retain(|_, v| *v > 0), 1);
        assert_eq!(*locks.lock("keep").await, 1);
    }
}
