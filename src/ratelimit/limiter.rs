//! Core rate limiter implementation.
//!
//! A [`Limiter`] composes a pure limiting [`Algorithm`] with a [`RateLimit`],
//! a rate storage, a key mutex and a clock. It holds no per-key state of its
//! own. With blocking capabilities it implements [`RateLimiter`]; with async
//! capabilities it implements [`AsyncRateLimiter`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock};
use super::mutex::{AsyncKeyMutex, KeyMutex};
use super::rate::{Rate, RateLimit};
use super::storage::{AsyncRateStorage, RateStorage};
use crate::error::Result;

/// Admission decisions for keys, made while blocking the calling thread.
pub trait RateLimiter<K>: Send + Sync {
    /// Record an operation for `key` and report whether it exceeds the quota.
    fn limit_exceeded(&self, key: &K) -> Result<bool>;
}

/// Admission decisions for keys, made while suspending only the calling task.
#[async_trait]
pub trait AsyncRateLimiter<K: Send + Sync>: Send + Sync {
    /// Record an operation for `key` and report whether it exceeds the quota.
    async fn limit_exceeded(&self, key: &K) -> Result<bool>;
}

impl<K, T> RateLimiter<K> for Arc<T>
where
    T: RateLimiter<K> + ?Sized,
{
    fn limit_exceeded(&self, key: &K) -> Result<bool> {
        (**self).limit_exceeded(key)
    }
}

#[async_trait]
impl<K, T> AsyncRateLimiter<K> for Arc<T>
where
    K: Send + Sync,
    T: AsyncRateLimiter<K> + ?Sized,
{
    async fn limit_exceeded(&self, key: &K) -> Result<bool> {
        (**self).limit_exceeded(key).await
    }
}

/// Outcome of evaluating one operation against the stored rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the operation is rejected
    pub exceeded: bool,
    /// Rate to store for the key, if any
    pub update: Option<Rate>,
}

impl Verdict {
    /// Accept the operation and store `rate`.
    pub fn admit(rate: Rate) -> Self {
        Self {
            exceeded: false,
            update: Some(rate),
        }
    }

    /// Reject the operation, leaving storage untouched.
    pub fn reject() -> Self {
        Self {
            exceeded: true,
            update: None,
        }
    }
}

/// A time-based quota rule.
///
/// Implementations are pure: they see the stored rate and the current time
/// and return a [`Verdict`]. Locking and storage belong to [`Limiter`].
pub trait Algorithm: Send + Sync {
    /// Name used in logs.
    const NAME: &'static str;

    fn evaluate(&self, limit: &RateLimit, rate: Rate, now: Instant) -> Verdict;
}

/// A rate limiter built from an [`Algorithm`] and injected capabilities.
#[derive(Debug)]
pub struct Limiter<A, S, M, C = MonotonicClock> {
    algorithm: A,
    rate_limit: RateLimit,
    rate_storage: S,
    key_mutex: M,
    clock: C,
}

impl<A, S, M> Limiter<A, S, M>
where
    A: Algorithm + Default,
{
    /// Create a limiter reading time from the monotonic clock.
    pub fn new(rate_limit: RateLimit, rate_storage: S, key_mutex: M) -> Self {
        Self::with_clock(rate_limit, rate_storage, key_mutex, MonotonicClock)
    }
}

impl<A, S, M, C> Limiter<A, S, M, C>
where
    A: Algorithm + Default,
    C: Clock,
{
    /// Create a limiter reading time from `clock`.
    pub fn with_clock(rate_limit: RateLimit, rate_storage: S, key_mutex: M, clock: C) -> Self {
        Self {
            algorithm: A::default(),
            rate_limit,
            rate_storage,
            key_mutex,
            clock,
        }
    }
}

impl<A, S, M, C> Limiter<A, S, M, C>
where
    A: Algorithm,
    C: Clock,
{
    /// The configured quota.
    pub fn rate_limit(&self) -> &RateLimit {
        &self.rate_limit
    }

    /// The storage holding per-key rates.
    pub fn rate_storage(&self) -> &S {
        &self.rate_storage
    }

    fn decide(&self, rate: Rate) -> Verdict {
        let now = self.clock.now();
        let verdict = self.algorithm.evaluate(&self.rate_limit, rate, now);

        trace!(
            algorithm = A::NAME,
            operations = rate.operations,
            exceeded = verdict.exceeded,
            "Evaluated rate"
        );
        if verdict.exceeded {
            debug!(
                algorithm = A::NAME,
                limit = %self.rate_limit,
                "Rate limit exceeded"
            );
        }

        verdict
    }
}

impl<K, A, S, M, C> RateLimiter<K> for Limiter<A, S, M, C>
where
    A: Algorithm,
    S: RateStorage<K>,
    M: KeyMutex<K>,
    C: Clock,
{
    fn limit_exceeded(&self, key: &K) -> Result<bool> {
        let _guard = self.key_mutex.lock(key)?;
        let rate = self.rate_storage.read(key)?;
        let verdict = self.decide(rate);
        if let Some(update) = verdict.update {
            self.rate_storage.write(key, update)?;
        }
        Ok(verdict.exceeded)
    }
}

#[async_trait]
impl<K, A, S, M, C> AsyncRateLimiter<K> for Limiter<A, S, M, C>
where
    K: Send + Sync,
    A: Algorithm,
    S: AsyncRateStorage<K>,
    M: AsyncKeyMutex<K>,
    C: Clock,
{
    async fn limit_exceeded(&self, key: &K) -> Result<bool> {
        let _guard = self.key_mutex.lock(key).await?;
        let rate = self.rate_storage.read(key).await?;
        let verdict = self.decide(rate);
        if let Some(update) = verdict.update {
            self.rate_storage.write(key, update).await?;
        }
        Ok(verdict.exceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyrateError;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::mutex::{AsyncMemoryMutex, MemoryMutex};
    use crate::ratelimit::storage::MemoryStorage;
    use crate::ratelimit::{FixedWindow, FixedWindowLimiter, LeakyBucket, SlidingWindow};
    use std::time::Duration;

    fn per_minute(operations: u64) -> RateLimit {
        RateLimit::new(operations, Duration::from_secs(60)).unwrap()
    }

    /// Storage whose every call fails.
    struct BrokenStorage;

    impl RateStorage<String> for BrokenStorage {
        fn read(&self, _key: &String) -> Result<Rate> {
            Err(KeyrateError::Storage("unreachable".to_string()))
        }

        fn write(&self, _key: &String, _rate: Rate) -> Result<()> {
            Err(KeyrateError::Storage("unreachable".to_string()))
        }
    }

    /// Storage that reads fine but cannot write.
    struct ReadOnlyStorage(MemoryStorage<String>);

    impl RateStorage<String> for ReadOnlyStorage {
        fn read(&self, key: &String) -> Result<Rate> {
            Ok(self.0.read(key))
        }

        fn write(&self, _key: &String, _rate: Rate) -> Result<()> {
            Err(KeyrateError::Storage("read only".to_string()))
        }
    }

    #[test]
    fn test_storage_read_failure_propagates() {
        let mutex = Arc::new(MemoryMutex::new());
        let limiter: FixedWindowLimiter<_, _> =
            Limiter::new(per_minute(5), BrokenStorage, Arc::clone(&mutex));
        let key = "client".to_string();

        let err = RateLimiter::limit_exceeded(&limiter, &key).unwrap_err();
        assert!(matches!(err, KeyrateError::Storage(_)));
        assert!(!mutex.is_locked(&key));
    }

    #[test]
    fn test_storage_write_failure_propagates_and_releases_lock() {
        let mutex = Arc::new(MemoryMutex::new());
        let limiter = FixedWindowLimiter::new(
            per_minute(5),
            ReadOnlyStorage(MemoryStorage::new()),
            Arc::clone(&mutex),
        );
        let key = "client".to_string();

        assert!(RateLimiter::limit_exceeded(&limiter, &key).is_err());
        assert!(!mutex.is_locked(&key));
    }

    #[test]
    fn test_limiter_shares_storage_between_instances() {
        let storage = Arc::new(MemoryStorage::new());
        let mutex = Arc::new(MemoryMutex::new());
        let first = FixedWindowLimiter::new(per_minute(2), Arc::clone(&storage), Arc::clone(&mutex));
        let second = FixedWindowLimiter::new(per_minute(2), Arc::clone(&storage), Arc::clone(&mutex));

        assert!(!RateLimiter::limit_exceeded(&first, &"key").unwrap());
        assert!(!RateLimiter::limit_exceeded(&second, &"key").unwrap());
        assert!(RateLimiter::limit_exceeded(&first, &"key").unwrap());
        assert_eq!(storage.len(), 1);
    }

    type Blocking<A> = Limiter<A, MemoryStorage<&'static str>, MemoryMutex<&'static str>>;

    fn admitted_by_threads(limiter: &dyn RateLimiter<&'static str>) -> usize {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..20)
                            .filter(|_| !limiter.limit_exceeded(&"shared").unwrap())
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        })
    }

    #[test]
    fn test_concurrent_calls_never_over_admit() {
        let sliding: Blocking<SlidingWindow> =
            Limiter::new(per_minute(1), MemoryStorage::new(), MemoryMutex::new());
        let fixed: Blocking<FixedWindow> =
            Limiter::new(per_minute(25), MemoryStorage::new(), MemoryMutex::new());
        let leaky: Blocking<LeakyBucket> =
            Limiter::new(per_minute(25), MemoryStorage::new(), MemoryMutex::new());

        assert_eq!(admitted_by_threads(&sliding), 1);
        assert_eq!(admitted_by_threads(&fixed), 25);
        assert_eq!(admitted_by_threads(&leaky), 25);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_async_concurrent_calls_never_over_admit() {
        let limiter = Arc::new(FixedWindowLimiter::new(
            per_minute(10),
            MemoryStorage::new(),
            AsyncMemoryMutex::new(),
        ));

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    AsyncRateLimiter::limit_exceeded(&limiter, &"shared".to_string()).await
                })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            if !task.await.unwrap().unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn test_async_and_blocking_variants_agree() {
        let clock = ManualClock::new();
        let blocking = Limiter::<FixedWindow, _, _, _>::with_clock(
            per_minute(3),
            MemoryStorage::with_clock(clock.clone()),
            MemoryMutex::new(),
            clock.clone(),
        );
        let nonblocking = Limiter::<FixedWindow, _, _, _>::with_clock(
            per_minute(3),
            MemoryStorage::with_clock(clock.clone()),
            AsyncMemoryMutex::new(),
            clock.clone(),
        );

        for _ in 0..5 {
            let expected = RateLimiter::limit_exceeded(&blocking, &"key").unwrap();
            let actual = AsyncRateLimiter::limit_exceeded(&nonblocking, &"key").await.unwrap();
            assert_eq!(expected, actual);
        }
    }
}
