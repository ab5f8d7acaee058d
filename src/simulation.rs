//! Drives a configured limiter with a burst of concurrent calls.
//!
//! Used by the `keyrate` binary to show how each algorithm treats the same
//! traffic. All calls share one key, so every task contends for the same
//! per-key critical section.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{AlgorithmKind, LimiterConfig};
use crate::error::Result;
use crate::ratelimit::{
    AsyncKeyMutex, AsyncMemoryMutex, AsyncRateLimiter, BucketLimiter, FixedWindowLimiter,
    LeakyBucketLimiter, MemoryBucketStorage, MemoryStorage, SlidingWindowLimiter,
};

/// The traffic to send through a limiter.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub key: String,
    pub calls: u32,
    /// Number of tasks the calls are spread over
    pub concurrency: usize,
    /// Pause each task takes between its calls
    pub interval: Duration,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            key: "client".to_string(),
            calls: 20,
            concurrency: 4,
            interval: Duration::ZERO,
        }
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub algorithm: AlgorithmKind,
    pub limit: String,
    pub key: String,
    pub calls: u32,
    pub admitted: u64,
    pub rejected: u64,
    pub elapsed_ms: u128,
}

/// Build the limiter described by `config`, backed by process memory.
pub fn limiter_from_config(config: &LimiterConfig) -> Arc<dyn AsyncRateLimiter<String>> {
    let rate_limit = config.rate_limit;
    match config.algorithm {
        AlgorithmKind::FixedWindow => Arc::new(FixedWindowLimiter::new(
            rate_limit,
            MemoryStorage::<String>::new(),
            AsyncMemoryMutex::<String>::new(),
        )),
        AlgorithmKind::SlidingWindow => Arc::new(SlidingWindowLimiter::new(
            rate_limit,
            MemoryStorage::<String>::new(),
            AsyncMemoryMutex::<String>::new(),
        )),
        AlgorithmKind::LeakyBucket => Arc::new(LeakyBucketLimiter::new(
            rate_limit,
            MemoryStorage::<String>::new(),
            AsyncMemoryMutex::<String>::new(),
        )),
        AlgorithmKind::Bucket => Arc::new(LockedBucket {
            limiter: BucketLimiter::new(MemoryBucketStorage::new(
                config.bucket.capacity,
                config.bucket.leak_rate(),
            )),
            key_mutex: AsyncMemoryMutex::new(),
        }),
    }
}

/// A [`BucketLimiter`] whose read, fill and write run under a per-key lock.
struct LockedBucket {
    limiter: BucketLimiter<MemoryBucketStorage<String>>,
    key_mutex: AsyncMemoryMutex<String>,
}

#[async_trait]
impl AsyncRateLimiter<String> for LockedBucket {
    async fn limit_exceeded(&self, key: &String) -> Result<bool> {
        let _guard = self.key_mutex.lock(key).await?;
        self.limiter.limit_exceeded(key, 1)
    }
}

/// Run `plan` against the limiter built from `config`.
pub async fn run(config: &LimiterConfig, plan: &SimulationPlan) -> Result<SimulationReport> {
    let limiter = limiter_from_config(config);
    let limit = match config.algorithm {
        AlgorithmKind::Bucket => format!(
            "capacity {} draining {}",
            config.bucket.capacity, config.bucket.leak_rate
        ),
        _ => config.rate_limit.to_string(),
    };

    info!(
        algorithm = ?config.algorithm,
        limit = %limit,
        calls = plan.calls,
        concurrency = plan.concurrency,
        "Starting simulation"
    );

    let started = Instant::now();
    let (admitted, rejected) = drive(limiter, plan).await?;

    Ok(SimulationReport {
        algorithm: config.algorithm,
        limit,
        key: plan.key.clone(),
        calls: plan.calls,
        admitted,
        rejected,
        elapsed_ms: started.elapsed().as_millis(),
    })
}

/// Send the planned calls through `limiter` and count the decisions.
///
/// Returns `(admitted, rejected)`.
pub async fn drive(
    limiter: Arc<dyn AsyncRateLimiter<String>>,
    plan: &SimulationPlan,
) -> Result<(u64, u64)> {
    let tasks = plan.concurrency.max(1);
    let per_task = plan.calls as usize / tasks;
    let remainder = plan.calls as usize % tasks;

    let handles = (0..tasks).map(|task| {
        let limiter = Arc::clone(&limiter);
        let key = plan.key.clone();
        let interval = plan.interval;
        let calls = per_task + usize::from(task < remainder);

        tokio::spawn(async move {
            let mut admitted = 0u64;
            let mut rejected = 0u64;
            for call in 0..calls {
                if call > 0 && !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }

                let exceeded = limiter.limit_exceeded(&key).await?;
                debug!(task, call, exceeded, "Checked rate limit");
                if exceeded {
                    rejected += 1;
                } else {
                    admitted += 1;
                }
            }
            Ok::<_, crate::error::KeyrateError>((admitted, rejected))
        })
    });

    let mut admitted = 0;
    let mut rejected = 0;
    for outcome in try_join_all(handles).await? {
        let (task_admitted, task_rejected) = outcome?;
        admitted += task_admitted;
        rejected += task_rejected;
    }

    Ok((admitted, rejected))
}
