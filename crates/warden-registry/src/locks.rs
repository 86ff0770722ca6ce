//! Per-package mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use warden_core::PackageId;

/// One async mutex per package id, created on first use and dropped once
/// nobody holds or waits for it.
///
/// Operations on the same id queue behind each other; operations on
/// different ids never contend.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: DashMap<PackageId, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub(crate) async fn lock(&self, id: &PackageId) -> KeyedGuard<'_> {
        // The map shard guard must be released before awaiting.
        let mutex = Arc::clone(&self.locks.entry(id.clone()).or_default());
        KeyedGuard {
            locks: &self.locks,
            id: id.clone(),
            guard: Some(mutex.lock_owned().await),
        }
    }
}

/// Holds one id's lock. Removes the id's mutex on drop when it is unused.
pub(crate) struct KeyedGuard<'a> {
    locks: &'a DashMap<PackageId, Arc<Mutex<()>>>,
    id: PackageId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedGuard<'_> {
    fn drop(&mut self) {
        // Release first: the guard owns a reference to the mutex.
        drop(self.guard.take());
        // Clones are only taken under the shard lock, so a count of one
        // here means no holder and no waiter.
        self.locks
            .remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_id_serializes_other_ids_do_not() {
        let locks = Arc::new(KeyedLocks::default());
        let a = PackageId::new("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let b = PackageId::new("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").unwrap();

        let held = locks.lock(&a).await;
        let _other = tokio::time::timeout(Duration::from_millis(100), locks.lock(&b))
            .await
            .expect("different id must not block");
        assert!(
            tokio::time::timeout(Duration::from_millis(50), locks.lock(&a))
                .await
                .is_err()
        );
        drop(held);
        let _again = locks.lock(&a).await;
    }

    #[tokio::test]
    async fn unused_entries_are_pruned() {
        let locks = KeyedLocks::default();
        for c in ['a', 'b', 'c'] {
            let id = PackageId::new(c.to_string().repeat(32)).unwrap();
            let _guard = locks.lock(&id).await;
            assert_eq!(locks.locks.len(), 1);
        }
        assert!(locks.locks.is_empty());
    }

    #[tokio::test]
    async fn entry_with_a_waiter_is_kept() {
        let locks = Arc::new(KeyedLocks::default());
        let a = PackageId::new("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();

        let held = locks.lock(&a).await;
        let waiter = tokio::spawn({
            let locks = Arc::clone(&locks);
            let a = a.clone();
            async move {
                let _guard = locks.lock(&a).await;
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert_eq!(locks.locks.len(), 1, "the waiter still needs the mutex");

        waiter.await.unwrap();
        assert!(locks.locks.is_empty());
    }
}
