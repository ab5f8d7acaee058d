//! Keyrate - Pluggable Per-Key Rate Limiting
//!
//! This crate decides, per key, whether an operation stays within a
//! time-based quota. Fixed window, sliding window and leaky bucket limiters
//! are assembled from a quota, a rate storage and a key mutex, each in a
//! blocking and an async flavour. A volume-based bucket and a guard for
//! rate limited function calls sit alongside them.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod simulation;
