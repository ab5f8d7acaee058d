use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use keyrate::config::{AlgorithmKind, KeyrateConfig};
use keyrate::ratelimit::RateLimit;
use keyrate::simulation::{self, SimulationPlan};

/// Send a burst of calls through a rate limiter and report the decisions.
#[derive(Debug, Parser)]
#[command(name = "keyrate", version, about)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Limiting algorithm, overriding the configuration
    #[arg(short, long, value_enum)]
    algorithm: Option<AlgorithmKind>,

    /// Quota such as "100/m", overriding the configuration
    #[arg(short, long)]
    limit: Option<RateLimit>,

    /// Key every call is made against
    #[arg(short, long, default_value = "client")]
    key: String,

    /// Total number of calls
    #[arg(short = 'n', long, default_value_t = 20)]
    calls: u32,

    /// Number of concurrent tasks
    #[arg(short = 'j', long, default_value_t = 4)]
    concurrency: usize,

    /// Pause between consecutive calls of one task, in milliseconds
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = KeyrateConfig::load(cli.config.as_deref())?;
    if let Some(algorithm) = cli.algorithm {
        config.limiter.algorithm = algorithm;
    }
    if let Some(limit) = cli.limit {
        config.limiter.rate_limit = limit;
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let plan = SimulationPlan {
        key: cli.key,
        calls: cli.calls,
        concurrency: cli.concurrency,
        interval: Duration::from_millis(cli.interval_ms),
    };

    let report = tokio::select! {
        report = simulation::run(&config.limiter, &plan) => report?,
        stopped = stop_signal() => {
            let name = stopped?;
            warn!(signal = name, "Simulation interrupted");
            return Ok(());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            algorithm = ?report.algorithm,
            limit = %report.limit,
            key = %report.key,
            admitted = report.admitted,
            rejected = report.rejected,
            elapsed_ms = report.elapsed_ms as u64,
            "Simulation finished"
        );
    }

    Ok(())
}

/// Resolve with the name of the first stop signal received.
#[cfg(unix)]
async fn stop_signal() -> std::io::Result<&'static str> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = signal::ctrl_c() => result.map(|()| "Ctrl+C"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn stop_signal() -> std::io::Result<&'static str> {
    signal::ctrl_c().await.map(|()| "Ctrl+C")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_signal_waits_for_a_signal() {
        let waited = tokio::time::timeout(Duration::from_millis(20), stop_signal()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_cli_overrides_parse() {
        let cli = Cli::try_parse_from([
            "keyrate",
            "--algorithm",
            "fixed-window",
            "--limit",
            "3/s",
            "-n",
            "9",
        ])
        .unwrap();

        assert_eq!(cli.algorithm, Some(AlgorithmKind::FixedWindow));
        assert_eq!(cli.limit, Some("3/s".parse().unwrap()));
        assert_eq!(cli.calls, 9);
        assert_eq!(cli.concurrency, 4);
    }
}
