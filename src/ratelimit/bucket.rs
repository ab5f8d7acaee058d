//! Volume-based leaky buckets.
//!
//! Unlike the rate-based limiters, a [`Bucket`] carries its own capacity and
//! drain rate and accepts operations of any size. [`BucketLimiter`] performs
//! an unguarded read, fill and write; callers sharing a bucket across threads
//! need their own locking to avoid lost updates.

use std::hash::Hash;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::clock::{Clock, MonotonicClock};
use super::limiter::{AsyncRateLimiter, RateLimiter};
use super::rate::RateLimit;
use crate::error::{KeyrateError, Result};

/// How much volume drains per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakRate {
    pub volume: u64,
    pub period: Duration,
}

impl LeakRate {
    pub fn new(volume: u64, period: Duration) -> Self {
        Self { volume, period }
    }

    /// Volume drained between `last_leak` and now.
    pub fn leak(&self, last_leak: Instant) -> Result<u64> {
        self.leak_at(last_leak, Instant::now())
    }

    /// Volume drained between `last_leak` and `now`, rounded down.
    ///
    /// Fails when `last_leak` is later than `now`.
    pub fn leak_at(&self, last_leak: Instant, now: Instant) -> Result<u64> {
        if last_leak > now {
            return Err(KeyrateError::ClockSkew {
                ahead: last_leak - now,
            });
        }
        if self.period.is_zero() {
            return Ok(u64::MAX);
        }

        let elapsed = now - last_leak;
        Ok((elapsed.as_secs_f64() / self.period.as_secs_f64() * self.volume as f64) as u64)
    }
}

impl From<RateLimit> for LeakRate {
    fn from(limit: RateLimit) -> Self {
        Self::new(limit.operations(), limit.period())
    }
}

/// Accumulated load that has not drained yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub capacity: u64,
    /// Always within `0..=capacity`
    pub volume: u64,
    pub last_leak: Instant,
    pub leak_rate: LeakRate,
}

impl Bucket {
    /// An empty bucket whose drain starts at `now`.
    pub fn new(capacity: u64, leak_rate: LeakRate, now: Instant) -> Self {
        Self {
            capacity,
            volume: 0,
            last_leak: now,
            leak_rate,
        }
    }

    /// Drain, then pour in `volume`. Returns `true` if the bucket overflowed.
    pub fn overflows(&mut self, volume: u64) -> Result<bool> {
        self.overflows_at(volume, Instant::now())
    }

    /// [`overflows`](Self::overflows) as seen at `now`.
    ///
    /// An overflowing bucket is left full.
    pub fn overflows_at(&mut self, volume: u64, now: Instant) -> Result<bool> {
        let leaked = self.leak_rate.leak_at(self.last_leak, now)?;
        self.volume = self.volume.saturating_sub(leaked);
        self.last_leak = now;

        self.volume = self.volume.saturating_add(volume);
        if self.volume > self.capacity {
            self.volume = self.capacity;
            return Ok(true);
        }

        Ok(false)
    }
}

/// Read/write access to the [`Bucket`] of each key.
pub trait BucketStorage<K>: Send + Sync {
    fn read(&self, key: &K) -> Result<Bucket>;

    fn write(&self, key: &K, bucket: Bucket) -> Result<()>;
}

/// Buckets held in process memory.
///
/// Unknown keys read as an empty bucket, which is only kept once written.
#[derive(Debug)]
pub struct MemoryBucketStorage<K, C = MonotonicClock>
where
    K: Eq + Hash,
{
    buckets: DashMap<K, Bucket>,
    capacity: u64,
    leak_rate: LeakRate,
    clock: C,
}

impl<K> MemoryBucketStorage<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: u64, leak_rate: LeakRate) -> Self {
        Self::with_clock(capacity, leak_rate, MonotonicClock)
    }
}

impl<K, C> MemoryBucketStorage<K, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    pub fn with_clock(capacity: u64, leak_rate: LeakRate, clock: C) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            leak_rate,
            clock,
        }
    }

    pub fn read(&self, key: &K) -> Bucket {
        match self.buckets.get(key) {
            Some(bucket) => *bucket,
            None => Bucket::new(self.capacity, self.leak_rate, self.clock.now()),
        }
    }

    pub fn write(&self, key: &K, bucket: Bucket) {
        self.buckets.insert(key.clone(), bucket);
    }

    /// Number of stored buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl<K, C> BucketStorage<K> for MemoryBucketStorage<K, C>
where
    K: Eq + Hash + Clone + Send + Sync,
    C: Clock,
{
    fn read(&self, key: &K) -> Result<Bucket> {
        Ok(MemoryBucketStorage::read(self, key))
    }

    fn write(&self, key: &K, bucket: Bucket) -> Result<()> {
        MemoryBucketStorage::write(self, key, bucket);
        Ok(())
    }
}

/// Admits operations while their key's bucket does not overflow.
#[derive(Debug)]
pub struct BucketLimiter<S, C = MonotonicClock> {
    storage: S,
    clock: C,
}

impl<S> BucketLimiter<S> {
    pub fn new(storage: S) -> Self {
        Self::with_clock(storage, MonotonicClock)
    }
}

impl<S, C: Clock> BucketLimiter<S, C> {
    pub fn with_clock(storage: S, clock: C) -> Self {
        Self { storage, clock }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Pour `volume` into the bucket of `key` and report whether it overflowed.
    ///
    /// The bucket is written back either way.
    pub fn limit_exceeded<K>(&self, key: &K, volume: u64) -> Result<bool>
    where
        S: BucketStorage<K>,
    {
        let mut bucket = self.storage.read(key)?;
        let overflowed = bucket.overflows_at(volume, self.clock.now())?;
        self.storage.write(key, bucket)?;

        if overflowed {
            debug!(
                capacity = bucket.capacity,
                volume,
                "Bucket overflowed"
            );
        }
        Ok(overflowed)
    }
}

impl<K, S, C> RateLimiter<K> for BucketLimiter<S, C>
where
    S: BucketStorage<K>,
    C: Clock,
{
    fn limit_exceeded(&self, key: &K) -> Result<bool> {
        BucketLimiter::limit_exceeded(self, key, 1)
    }
}

#[async_trait]
impl<K, S, C> AsyncRateLimiter<K> for BucketLimiter<S, C>
where
    K: Send + Sync,
    S: BucketStorage<K>,
    C: Clock,
{
    async fn limit_exceeded(&self, key: &K) -> Result<bool> {
        BucketLimiter::limit_exceeded(self, key, 1)
    }
}
