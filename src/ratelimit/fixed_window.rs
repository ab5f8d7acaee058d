//! Fixed window counting.
//!
//! A window opens with the first operation after the previous one expired and
//! lasts one period. Operations are counted until it closes. Bursts on both
//! sides of a window boundary can admit up to twice the quota in a short span.

use std::time::Instant;

use super::clock::MonotonicClock;
use super::limiter::{Algorithm, Limiter, Verdict};
use super::rate::{Rate, RateLimit};

/// The fixed window algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindow;

/// A [`Limiter`] using [`FixedWindow`].
pub type FixedWindowLimiter<S, M, C = MonotonicClock> = Limiter<FixedWindow, S, M, C>;

impl Algorithm for FixedWindow {
    const NAME: &'static str = "fixed_window";

    fn evaluate(&self, limit: &RateLimit, rate: Rate, now: Instant) -> Verdict {
        if now.saturating_duration_since(rate.updated_at) < limit.period() {
            // Rejected operations still count against the open window.
            let operations = rate.operations.saturating_add(1);
            return Verdict {
                exceeded: operations > limit.operations(),
                update: Some(Rate::new(operations, rate.updated_at)),
            };
        }

        Verdict::admit(Rate::new(1, now))
    }
}
