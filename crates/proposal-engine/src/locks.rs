//! Keyed async locks for the execute path

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// One async mutex per key (proposal id or treasury id). Held across the
/// chain submission so at most one execute per key is in flight.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<LockMap>,
}

/// Held lock on one key. Dropping it unlocks and forgets the key once
/// nobody else holds or waits on it.
#[derive(Debug)]
pub struct KeyedGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
    key: String,
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // Unlock first so our own Arc no longer counts
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        // Declared before the lock so a cancelled wait still cleans up
        let mut held = KeyedGuard {
            guard: None,
            locks: self.locks.clone(),
            key: key.to_string(),
        };
        // Clone the Arc out so the shard guard is dropped before awaiting
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        held.guard = Some(lock.lock_owned().await);
        held
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = KeyedLocks::new();
        let guard = locks.acquire("p1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("p1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("p1").await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("p2"))
            .await
            .unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_drop_forgets_idle_keys() {
        let locks = KeyedLocks::new();
        let first = locks.acquire("p1").await;
        let second = locks.acquire("p2").await;
        assert_eq!(locks.len(), 2);

        drop(first);
        assert_eq!(locks.len(), 1);
        drop(second);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_wait_does_not_leak() {
        let locks = KeyedLocks::new();
        let guard = locks.acquire("p1").await;

        // Waiter gives up while the key is held
        let gave_up = tokio::time::timeout(Duration::from_millis(20), locks.acquire("p1")).await;
        assert!(gave_up.is_err());
        assert_eq!(locks.len(), 1);

        drop(guard);
        assert!(locks.is_empty());
    }
}
