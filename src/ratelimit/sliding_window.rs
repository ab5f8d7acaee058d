//! Sliding window estimation.
//!
//! Approximates a sliding log with two scalars: the stored count and the time
//! since it was last updated. The earlier window contributes in proportion to
//! how much of it still overlaps the current one:
//!
//! ```text
//! estimated = previous * (period - elapsed) / period + current
//! ```
//!
//! While the stored window is still open, `previous` is taken to be the full
//! quota. Once more than a period has passed, the stored count becomes
//! `previous` and counting restarts from zero.

use std::time::Instant;

use super::clock::MonotonicClock;
use super::limiter::{Algorithm, Limiter, Verdict};
use super::rate::{Rate, RateLimit};

/// The sliding window algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindow;

/// A [`Limiter`] using [`SlidingWindow`].
pub type SlidingWindowLimiter<S, M, C = MonotonicClock> = Limiter<SlidingWindow, S, M, C>;

impl Algorithm for SlidingWindow {
    const NAME: &'static str = "sliding_window";

    fn evaluate(&self, limit: &RateLimit, rate: Rate, now: Instant) -> Verdict {
        let period = limit.period().as_secs_f64();
        let elapsed = now.saturating_duration_since(rate.updated_at).as_secs_f64();

        let (previous, current) = if elapsed > period {
            (rate.operations, Rate::starting_at(now))
        } else {
            (limit.operations(), rate)
        };

        let remaining = period - elapsed;
        let estimated = previous as f64 * (remaining / period) + current.operations as f64;

        if estimated > limit.operations() as f64 {
            return Verdict::reject();
        }

        Verdict::admit(Rate::new(current.operations.saturating_add(1), now))
    }
}
