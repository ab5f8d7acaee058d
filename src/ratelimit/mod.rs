//! Rate limiting algorithms and the capabilities they are built from.

mod bucket;
mod clock;
mod fixed_window;
mod leaky_bucket;
mod limiter;
mod mutex;
mod parse;
mod rate;
mod sliding_window;
mod storage;
mod wrap;

pub use bucket::{Bucket, BucketLimiter, BucketStorage, LeakRate, MemoryBucketStorage};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use fixed_window::{FixedWindow, FixedWindowLimiter};
pub use leaky_bucket::{LeakyBucket, LeakyBucketLimiter};
pub use limiter::{Algorithm, AsyncRateLimiter, Limiter, RateLimiter, Verdict};
pub use mutex::{AsyncKeyMutex, AsyncMemoryMutex, KeyMutex, MemoryMutex};
pub use parse::{parse_rate_limit, ParseRateLimitError};
pub use rate::{Rate, RateLimit};
pub use sliding_window::{SlidingWindow, SlidingWindowLimiter};
pub use storage::{AsyncRateStorage, MemoryStorage, RateStorage};
pub use wrap::RateLimited;
