//! Leaky bucket over a stored rate.
//!
//! The stored operation count drains continuously at `operations / period`.
//! The drained amount is reconstructed from the time since the last update,
//! so no background work is needed.

use std::time::Instant;

use super::clock::MonotonicClock;
use super::limiter::{Algorithm, Limiter, Verdict};
use super::rate::{Rate, RateLimit};

/// The leaky bucket algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeakyBucket;

/// A [`Limiter`] using [`LeakyBucket`].
pub type LeakyBucketLimiter<S, M, C = MonotonicClock> = Limiter<LeakyBucket, S, M, C>;

impl Algorithm for LeakyBucket {
    const NAME: &'static str = "leaky_bucket";

    fn evaluate(&self, limit: &RateLimit, rate: Rate, now: Instant) -> Verdict {
        let elapsed = now.saturating_duration_since(rate.updated_at);
        let leaked = (elapsed.as_secs_f64() / limit.period().as_secs_f64()
            * limit.operations() as f64) as u64;

        // Drained below empty clamps to zero.
        let operations = rate.operations.saturating_add(1).saturating_sub(leaked);

        if operations > limit.operations() {
            return Verdict::reject();
        }

        Verdict::admit(Rate::new(operations, now))
    }
}
