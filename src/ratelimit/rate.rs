//! Quota configuration and per-key consumption state.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::parse::{parse_rate_limit, ParseRateLimitError};
use crate::error::{KeyrateError, Result};

/// Quota consumption for one key at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    /// Operations counted against the quota
    pub operations: u64,
    /// When the state was last updated
    pub updated_at: Instant,
}

impl Rate {
    pub fn new(operations: u64, updated_at: Instant) -> Self {
        Self {
            operations,
            updated_at,
        }
    }

    /// An empty rate stamped at `now`.
    pub fn starting_at(now: Instant) -> Self {
        Self::new(0, now)
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::starting_at(Instant::now())
    }
}

/// The number of operations allowed per period.
///
/// Serialized in its string form (`"100/m"`, `"5/1.5h"`), so it can be written
/// directly in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RateLimit {
    operations: u64,
    period: Duration,
}

impl RateLimit {
    /// Create a rate limit, rejecting a zero operation count or period.
    pub fn new(operations: u64, period: Duration) -> Result<Self> {
        if operations == 0 {
            return Err(KeyrateError::InvalidRateLimit(
                "operations must be greater than zero".to_string(),
            ));
        }
        if period.is_zero() {
            return Err(KeyrateError::InvalidRateLimit(
                "period must be greater than zero".to_string(),
            ));
        }
        Ok(Self { operations, period })
    }

    /// Operations allowed per period.
    pub fn operations(&self) -> u64 {
        self.operations
    }

    /// Length of the period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.operations, self.period.as_secs_f64())
    }
}

impl FromStr for RateLimit {
    type Err = ParseRateLimitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        parse_rate_limit(s)
    }
}

impl TryFrom<String> for RateLimit {
    type Error = ParseRateLimitError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RateLimit> for String {
    fn from(limit: RateLimit) -> Self {
        limit.to_string()
    }
}
