//! Error types for keyrate.

use std::time::Duration;

use thiserror::Error;

use crate::ratelimit::ParseRateLimitError;

/// Main error type for keyrate operations.
#[derive(Error, Debug)]
pub enum KeyrateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limit with a zero operation count or a zero period
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),

    /// Malformed rate limit string
    #[error(transparent)]
    Parse(#[from] ParseRateLimitError),

    /// A stored timestamp lies in the future of the clock reading.
    #[error("Clock went backwards: last leak is {ahead:?} ahead of now")]
    ClockSkew { ahead: Duration },

    /// Storage backend failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// A spawned task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias for keyrate operations.
pub type Result<T> = std::result::Result<T, KeyrateError>;
