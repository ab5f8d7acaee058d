//! Key-scoped mutual exclusion.
//!
//! Both in-memory implementations keep a table from key to a lazily created
//! per-key lock. The table has its own short-lived lock, held only while the
//! per-key lock is looked up or inserted, so callers working on different keys
//! never wait on each other.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use tracing::debug;

use crate::error::Result;

/// Exclusive, key-scoped critical sections for blocking callers.
///
/// The section lasts as long as the returned guard; dropping the guard on any
/// exit path releases it.
pub trait KeyMutex<K>: Send + Sync {
    type Guard;

    fn lock(&self, key: &K) -> Result<Self::Guard>;
}

/// Exclusive, key-scoped critical sections for async callers.
///
/// Waiting for the section suspends the task, not the thread. Dropping the
/// `lock` future before it completes leaves nothing held.
#[async_trait]
pub trait AsyncKeyMutex<K: Send + Sync>: Send + Sync {
    type Guard: Send;

    async fn lock(&self, key: &K) -> Result<Self::Guard>;
}

impl<K, T> KeyMutex<K> for Arc<T>
where
    T: KeyMutex<K> + ?Sized,
{
    type Guard = T::Guard;

    fn lock(&self, key: &K) -> Result<Self::Guard> {
        (**self).lock(key)
    }
}

#[async_trait]
impl<K, T> AsyncKeyMutex<K> for Arc<T>
where
    K: Send + Sync,
    T: AsyncKeyMutex<K> + ?Sized,
{
    type Guard = T::Guard;

    async fn lock(&self, key: &K) -> Result<Self::Guard> {
        (**self).lock(key).await
    }
}

/// Get the lock for `key` from `table`, creating it on first use.
fn key_lock<K, L>(table: &Mutex<HashMap<K, Arc<L>>>, key: &K) -> Arc<L>
where
    K: Eq + Hash + Clone,
    L: Default,
{
    let mut locks = table.lock();
    if let Some(lock) = locks.get(key) {
        return Arc::clone(lock);
    }
    debug!(tracked_keys = locks.len() + 1, "Creating key lock");
    let lock = Arc::new(L::default());
    locks.insert(key.clone(), Arc::clone(&lock));
    lock
}

/// Drop the locks nobody holds or waits on. Returns how many were removed.
///
/// Guards and waiters keep their own `Arc`, so a count of one means only the
/// table refers to the lock.
fn prune_idle<K, L>(table: &Mutex<HashMap<K, Arc<L>>>) -> usize {
    let mut locks = table.lock();
    let before = locks.len();
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    let pruned = before - locks.len();
    if pruned > 0 {
        debug!(pruned, tracked_keys = locks.len(), "Pruned idle key locks");
    }
    pruned
}

/// In-memory [`KeyMutex`] that blocks the calling thread.
///
/// One lock is kept per distinct key seen; call [`prune`](Self::prune)
/// periodically when keys are unbounded.
#[derive(Debug)]
pub struct MemoryMutex<K> {
    key_locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> MemoryMutex<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a caller currently holds the section for `key`.
    pub fn is_locked(&self, key: &K) -> bool {
        self.key_locks
            .lock()
            .get(key)
            .is_some_and(|lock| lock.is_locked())
    }

    /// Number of keys with a lock allocated.
    pub fn len(&self) -> usize {
        self.key_locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_locks.lock().is_empty()
    }

    /// Forget the locks of keys that are not currently locked.
    pub fn prune(&self) -> usize {
        prune_idle(&self.key_locks)
    }
}

impl<K: Eq + Hash + Clone> Default for MemoryMutex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyMutex<K> for MemoryMutex<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    type Guard = ArcMutexGuard<RawMutex, ()>;

    fn lock(&self, key: &K) -> Result<Self::Guard> {
        let lock = key_lock(&self.key_locks, key);
        Ok(lock.lock_arc())
    }
}

/// In-memory [`AsyncKeyMutex`] built on [`tokio::sync::Mutex`].
///
/// Grows like [`MemoryMutex`] and is trimmed the same way.
#[derive(Debug)]
pub struct AsyncMemoryMutex<K> {
    key_locks: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K> AsyncMemoryMutex<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a task currently holds the section for `key`.
    pub fn is_locked(&self, key: &K) -> bool {
        self.key_locks
            .lock()
            .get(key)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Number of keys with a lock allocated.
    pub fn len(&self) -> usize {
        self.key_locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_locks.lock().is_empty()
    }

    /// Forget the locks of keys that are not currently locked.
    pub fn prune(&self) -> usize {
        prune_idle(&self.key_locks)
    }
}

impl<K: Eq + Hash + Clone> Default for AsyncMemoryMutex<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K> AsyncKeyMutex<K> for AsyncMemoryMutex<K>
where
    K: Eq + Hash + Clone + Send + Sync,
{
    type Guard = tokio::sync::OwnedMutexGuard<()>;

    async fn lock(&self, key: &K) -> Result<Self::Guard> {
        let lock = key_lock(&self.key_locks, key);
        Ok(lock.lock_owned().await)
    }
}
