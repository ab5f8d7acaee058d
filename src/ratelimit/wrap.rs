//! Rate limited function calls.

use std::future::Future;

use super::limiter::{AsyncRateLimiter, RateLimiter};
use crate::error::Result;

/// A function guarded by a rate limiter.
///
/// Each call derives a key from its arguments and asks the limiter first. When
/// the limit is exceeded the function is not run and a clone of `fallback` is
/// returned instead. Functions of several arguments take them as a tuple.
///
/// ```
/// use std::time::Duration;
/// use keyrate::ratelimit::{FixedWindowLimiter, MemoryMutex, MemoryStorage, RateLimit, RateLimited};
///
/// let limiter = FixedWindowLimiter::new(
///     RateLimit::new(1, Duration::from_secs(60)).unwrap(),
///     MemoryStorage::new(),
///     MemoryMutex::new(),
/// );
/// let greet = RateLimited::new(
///     limiter,
///     |name: &&str| name.to_string(),
///     None,
///     |name: &str| Some(format!("hello {name}")),
/// );
///
/// assert_eq!(greet.call("ada").unwrap(), Some("hello ada".to_string()));
/// assert_eq!(greet.call("ada").unwrap(), None);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimited<L, KF, F, T> {
    limiter: L,
    key: KF,
    fallback: T,
    function: F,
}

impl<L, KF, F, T> RateLimited<L, KF, F, T> {
    pub fn new(limiter: L, key: KF, fallback: T, function: F) -> Self {
        Self {
            limiter,
            key,
            fallback,
            function,
        }
    }

    pub fn limiter(&self) -> &L {
        &self.limiter
    }

    /// Call the function unless the blocking limiter rejects the key.
    pub fn call<A, K>(&self, args: A) -> Result<T>
    where
        L: RateLimiter<K>,
        KF: Fn(&A) -> K,
        F: Fn(A) -> T,
        T: Clone,
    {
        let key = (self.key)(&args);
        if self.limiter.limit_exceeded(&key)? {
            return Ok(self.fallback.clone());
        }
        Ok((self.function)(args))
    }

    /// Await the function unless the async limiter rejects the key.
    pub async fn call_async<A, K, Fut>(&self, args: A) -> Result<T>
    where
        K: Send + Sync,
        L: AsyncRateLimiter<K>,
        KF: Fn(&A) -> K,
        F: Fn(A) -> Fut,
        Fut: Future<Output = T>,
        T: Clone,
    {
        let key = (self.key)(&args);
        if self.limiter.limit_exceeded(&key).await? {
            return Ok(self.fallback.clone());
        }
        Ok((self.function)(args).await)
    }
}
