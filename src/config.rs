//! Configuration management for keyrate.
//!
//! Configuration is read from an optional file (any format the `config` crate
//! recognises by extension, usually YAML) and then overridden by environment
//! variables such as `KEYRATE__LIMITER__RATE_LIMIT=5/s`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{KeyrateError, Result};
use crate::ratelimit::{LeakRate, RateLimit};

/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "KEYRATE";

/// Main configuration for keyrate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyrateConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The limiting algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    FixedWindow,
    SlidingWindow,
    LeakyBucket,
    /// Volume-based bucket with its own capacity and leak rate
    Bucket,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: AlgorithmKind,

    /// Quota for the rate-based algorithms
    #[serde(default = "default_rate_limit")]
    pub rate_limit: RateLimit,

    /// Settings for [`AlgorithmKind::Bucket`]
    #[serde(default)]
    pub bucket: BucketConfig,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            rate_limit: default_rate_limit(),
            bucket: BucketConfig::default(),
        }
    }
}

fn default_algorithm() -> AlgorithmKind {
    AlgorithmKind::SlidingWindow
}

fn default_rate_limit() -> RateLimit {
    RateLimit::new(10, Duration::from_secs(1))
        .expect("10 operations per second is a valid rate limit")
}

/// Bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Maximum volume held before overflowing
    #[serde(default = "default_bucket_capacity")]
    pub capacity: u64,

    /// Volume drained per period, written like a rate limit (`"10/s"`)
    #[serde(default = "default_rate_limit")]
    pub leak_rate: RateLimit,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_bucket_capacity(),
            leak_rate: default_rate_limit(),
        }
    }
}

impl BucketConfig {
    pub fn leak_rate(&self) -> LeakRate {
        self.leak_rate.into()
    }
}

fn default_bucket_capacity() -> u64 {
    10
}

impl KeyrateConfig {
    /// Load configuration from an optional file and `KEYRATE__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Like [`load`](Self::load) with a custom environment prefix.
    pub fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: KeyrateConfig = builder
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| KeyrateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: KeyrateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| KeyrateError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.limiter.bucket.capacity == 0 {
            return Err(KeyrateError::Config(
                "bucket capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = KeyrateConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.limiter.algorithm, AlgorithmKind::SlidingWindow);
        assert_eq!(config.limiter.rate_limit.operations(), 10);
        assert_eq!(config.limiter.rate_limit.period(), Duration::from_secs(1));
        assert_eq!(config.limiter.bucket.capacity, 10);
        assert_eq!(
            config.limiter.bucket.leak_rate(),
            LeakRate::new(10, Duration::from_secs(1))
        );
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
logging:
  level: debug
  json: true
limiter:
  algorithm: leaky_bucket
  rate_limit: 100/m
  bucket:
    capacity: 20
    leak_rate: 5/1.5s
"#;
        let config = KeyrateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.limiter.algorithm, AlgorithmKind::LeakyBucket);
        assert_eq!(config.limiter.rate_limit.operations(), 100);
        assert_eq!(config.limiter.rate_limit.period(), Duration::from_secs(60));
        assert_eq!(
            config.limiter.bucket.leak_rate(),
            LeakRate::new(5, Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let config = KeyrateConfig::from_yaml("limiter:\n  algorithm: bucket\n").unwrap();
        assert_eq!(config.limiter.algorithm, AlgorithmKind::Bucket);
        assert_eq!(config.limiter.bucket.capacity, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_rate_limit_is_config_error() {
        let err = KeyrateConfig::from_yaml("limiter:\n  rate_limit: 10/w\n").unwrap_err();
        assert!(matches!(err, KeyrateError::Config(_)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = KeyrateConfig::from_yaml("limiter:\n  bucket:\n    capacity: 0\n").unwrap_err();
        assert!(matches!(err, KeyrateError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("keyrate-test-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "limiter:\n  algorithm: fixed_window\n  rate_limit: 3/s").unwrap();
        drop(file);

        let config = KeyrateConfig::load_with_env_prefix(Some(path.as_path()), "KEYRATE_TEST_FILE").unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.limiter.algorithm, AlgorithmKind::FixedWindow);
        assert_eq!(config.limiter.rate_limit.operations(), 3);
    }

    #[test]
    fn test_environment_overrides() {
        std::env::set_var("KEYRATE_TEST_ENV__LIMITER__RATE_LIMIT", "7/h");
        std::env::set_var("KEYRATE_TEST_ENV__LOGGING__LEVEL", "trace");

        let config = KeyrateConfig::load_with_env_prefix(None, "KEYRATE_TEST_ENV").unwrap();

        std::env::remove_var("KEYRATE_TEST_ENV__LIMITER__RATE_LIMIT");
        std::env::remove_var("KEYRATE_TEST_ENV__LOGGING__LEVEL");

        assert_eq!(config.limiter.rate_limit.operations(), 7);
        assert_eq!(config.limiter.rate_limit.period(), Duration::from_secs(3_600));
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let path = std::env::temp_dir().join("keyrate-does-not-exist.yaml");
        let err = KeyrateConfig::load_with_env_prefix(Some(path.as_path()), "KEYRATE_TEST_MISSING").unwrap_err();
        assert!(matches!(err, KeyrateError::Config(_)));
    }
}
