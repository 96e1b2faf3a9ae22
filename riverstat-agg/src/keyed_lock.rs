//! Per-key async mutual exclusion
//!
//! Each key maps to its own `tokio::sync::Mutex`, so read-modify-write
//! sequences on one record are serialized while different records proceed in
//! parallel. Waiting is bounded; a waiter that gives up gets
//! [`Error::Contention`], which the fold retry treats as transient.

use dashmap::DashMap;
use riverstat_common::{Error, Result};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Acquire `lock`, giving up after `timeout`
pub async fn acquire_within(
    lock: Arc<Mutex<()>>,
    timeout: Duration,
    what: &str,
) -> Result<OwnedMutexGuard<()>> {
    tokio::time::timeout(timeout, lock.lock_owned())
        .await
        .map_err(|_| {
            Error::Contention(format!(
                "timed out after {} ms waiting for {}",
                timeout.as_millis(),
                what
            ))
        })
}

/// Lazily created lock per key
pub struct KeyedLocks<K> {
    locks: DashMap<K, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Lock `key`, creating its mutex on first use
    pub async fn acquire(&self, key: &K) -> Result<OwnedMutexGuard<()>> {
        // Clone the Arc out so the shard guard is dropped before awaiting
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        acquire_within(lock, self.timeout, &format!("{:?}", key)).await
    }

    /// Drop mutexes nobody holds or waits on
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
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

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new(Duration::from_millis(20));
        let _held = locks.acquire(&"a").await.unwrap();

        let result = locks.acquire(&"a").await;
        assert!(matches!(result, Err(Error::Contention(_))));
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new(Duration::from_millis(20));
        let _a = locks.acquire(&"a").await.unwrap();
        let _b = locks.acquire(&"b").await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_lock_can_be_reacquired() {
        let locks = KeyedLocks::new(Duration::from_millis(20));
        drop(locks.acquire(&1).await.unwrap());
        assert!(locks.acquire(&1).await.is_ok());
    }

    #[tokio::test]
    async fn test_prune_idle_keeps_held_locks() {
        let locks = KeyedLocks::new(Duration::from_millis(20));
        let _held = locks.acquire(&1).await.unwrap();
        drop(locks.acquire(&2).await.unwrap());

        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.len(), 1);
    }
}
