//! Per-key rate storage.

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::clock::{Clock, MonotonicClock};
use super::rate::Rate;
use crate::error::Result;

/// Blocking read/write access to the [`Rate`] of each key.
///
/// `read` never reports a miss: an unknown key yields an empty rate, and that
/// rate is stored so the next read returns the same value.
pub trait RateStorage<K>: Send + Sync {
    fn read(&self, key: &K) -> Result<Rate>;

    fn write(&self, key: &K, rate: Rate) -> Result<()>;
}

/// Async counterpart of [`RateStorage`], for backends that suspend the task
/// rather than the thread.
#[async_trait]
pub trait AsyncRateStorage<K: Send + Sync>: Send + Sync {
    async fn read(&self, key: &K) -> Result<Rate>;

    async fn write(&self, key: &K, rate: Rate) -> Result<()>;
}

impl<K, T> RateStorage<K> for Arc<T>
where
    T: RateStorage<K> + ?Sized,
{
    fn read(&self, key: &K) -> Result<Rate> {
        (**self).read(key)
    }

    fn write(&self, key: &K, rate: Rate) -> Result<()> {
        (**self).write(key, rate)
    }
}

#[async_trait]
impl<K, T> AsyncRateStorage<K> for Arc<T>
where
    K: Send + Sync,
    T: AsyncRateStorage<K> + ?Sized,
{
    async fn read(&self, key: &K) -> Result<Rate> {
        (**self).read(key).await
    }

    async fn write(&self, key: &K, rate: Rate) -> Result<()> {
        (**self).write(key, rate).await
    }
}

/// Rates held in process memory.
///
/// Entries live until removed; there is no eviction.
#[derive(Debug)]
pub struct MemoryStorage<K, C = MonotonicClock>
where
    K: Eq + Hash,
{
    rates: DashMap<K, Rate>,
    clock: C,
}

impl<K: Eq + Hash + Clone> MemoryStorage<K> {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock)
    }
}

impl<K: Eq + Hash + Clone> Default for MemoryStorage<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, C> MemoryStorage<K, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    /// Create a storage that stamps fresh rates with `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            rates: DashMap::new(),
            clock,
        }
    }

    /// Read the rate of `key`, storing an empty one on first access.
    pub fn read(&self, key: &K) -> Rate {
        if let Some(rate) = self.rates.get(key) {
            return *rate;
        }
        *self
            .rates
            .entry(key.clone())
            .or_insert_with(|| Rate::starting_at(self.clock.now()))
    }

    pub fn write(&self, key: &K, rate: Rate) {
        self.rates.insert(key.clone(), rate);
    }

    pub fn remove(&self, key: &K) -> Option<Rate> {
        self.rates.remove(key).map(|(_, rate)| rate)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn clear(&self) {
        self.rates.clear();
    }
}

impl<K, C> RateStorage<K> for MemoryStorage<K, C>
where
    K: Eq + Hash + Clone + Send + Sync,
    C: Clock,
{
    fn read(&self, key: &K) -> Result<Rate> {
        Ok(MemoryStorage::read(self, key))
    }

    fn write(&self, key: &K, rate: Rate) -> Result<()> {
        MemoryStorage::write(self, key, rate);
        Ok(())
    }
}

#[async_trait]
impl<K, C> AsyncRateStorage<K> for MemoryStorage<K, C>
where
    K: Eq + Hash + Clone + Send + Sync,
    C: Clock,
{
    async fn read(&self, key: &K) -> Result<Rate> {
        Ok(MemoryStorage::read(self, key))
    }

    async fn write(&self, key: &K, rate: Rate) -> Result<()> {
        MemoryStorage::write(self, key, rate);
        Ok(())
    }
}
