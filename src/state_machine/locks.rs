//! Per-item advisory locks.
//!
//! One async mutex per item id, created on first use and dropped from the map
//! when the last holder releases it. Different items never contend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
pub struct ItemLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

/// Held for the duration of one transition
#[derive(Debug)]
pub struct ItemLockGuard {
    item_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, item_id: i64) -> ItemLockGuard {
        let mutex = self
            .locks
            .entry(item_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        ItemLockGuard {
            item_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of items currently holding or awaiting a lock
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for ItemLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map itself still references an idle mutex
        self.locks
            .remove_if(&self.item_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_released_and_pruned() {
        let locks = ItemLocks::new();
        {
            let _guard = locks.acquire(1).await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_same_item_is_serialized() {
        let locks = ItemLocks::new();
        let guard = locks.acquire(7).await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = contender.acquire(7).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn test_different_items_do_not_contend() {
        let locks = ItemLocks::new();
        let _a = locks.acquire(1).await;
        let _b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(2))
            .await
            .unwrap();
        assert_eq!(locks.active(), 2);
    }
}
