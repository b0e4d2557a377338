//! Fails job leases abandoned by crashed or stalled daemons.
//!
//! Usage:
//!
//! ```text
//! lease_sweeper [--once] [--dry-run]
//! ```
//!
//! Without flags the sweeper runs every `REELQUEUE_SWEEP_INTERVAL_SECS`
//! until interrupted. `--once` runs a single pass and exits. `--dry-run`
//! reports stale candidates without failing them. Settings come from the
//! environment (a `.env` file is honoured); see [`reelqueue::config`].

use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use mockable::DefaultClock;
use reelqueue::config::DispatchConfig;
use reelqueue::lease::adapters::postgres::PostgresLeaseStore;
use reelqueue::lease::services::{StaleLeaseSweeper, SweepReport};
use reelqueue::worker::SweepLoop;
use std::env;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that stop the sweeper before or during its run.
#[derive(Debug, Error)]
enum SweeperError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("configuration error: {0}")]
    Config(#[from] reelqueue::config::ConfigError),
    #[error("failed to build connection pool: {0}")]
    Pool(#[source] diesel::r2d2::PoolError),
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] std::io::Error),
    #[error("sweep failed: {0}")]
    Sweep(#[from] reelqueue::lease::services::SweepError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Options {
    once: bool,
    dry_run: bool,
}

impl Options {
    fn parse(args: impl Iterator<Item = String>) -> Result<Self, SweeperError> {
        let mut options = Self::default();
        for arg in args {
            match arg.as_str() {
                "--once" => options.once = true,
                "--dry-run" => options.dry_run = true,
                other => {
                    return Err(SweeperError::InvalidArgs(format!(
                        "unknown argument '{other}'; expected --once or --dry-run"
                    )));
                }
            }
        }
        Ok(options)
    }
}

fn main() -> Result<(), BoxError> {
    dotenvy::dotenv().ok();
    init_tracing();
    let options = Options::parse(env::args().skip(1))?;
    run(options).map_err(Into::into)
}

fn init_tracing() {
    let use_json = env::var("LOG_FORMAT").is_ok_and(|value| value.eq_ignore_ascii_case("json"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

fn run(options: Options) -> Result<(), SweeperError> {
    let config = DispatchConfig::from_env()?;
    let pool = Pool::builder()
        .max_size(config.pool_size)
        .build(ConnectionManager::<PgConnection>::new(&config.database_url))
        .map_err(SweeperError::Pool)?;
    let store = Arc::new(PostgresLeaseStore::new(pool));
    let sweeper = StaleLeaseSweeper::new(store, Arc::new(DefaultClock));
    let request = config.sweep_request().dry_run(options.dry_run);
    let sweep_loop = SweepLoop::new(sweeper, request, config.sweep_interval);

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(SweeperError::RuntimeInit)?;
    runtime.block_on(async {
        if options.once {
            let report = sweep_loop.run_once().await?;
            log_report(&report);
            return Ok(());
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for shutdown signal");
                return;
            }
            info!("shutdown requested");
            if shutdown_tx.send(true).is_err() {
                warn!("sweep loop already stopped");
            }
        });
        let passes = sweep_loop.run(shutdown_rx).await;
        info!(passes, "lease sweeper stopped");
        Ok(())
    })
}

fn log_report(report: &SweepReport) {
    for job in &report.candidates {
        info!(
            job_id = %job.id(),
            project_id = %job.project_id(),
            status = %job.status(),
            updated_at = %job.updated_at(),
            "stale lease"
        );
    }
    info!(
        candidates = report.candidates.len(),
        swept = report.swept.len(),
        skipped = report.skipped(),
        dry_run = report.dry_run,
        "sweep pass finished"
    );
}

#[cfg(test)]
mod tests {
    use super::{Options, SweeperError};
    use rstest::rstest;

    fn args(values: &[&str]) -> impl Iterator<Item = String> {
        values
            .iter()
            .map(|value| (*value).to_owned())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[rstest]
    #[case(&[], Options { once: false, dry_run: false })]
    #[case(&["--once"], Options { once: true, dry_run: false })]
    #[case(&["--dry-run", "--once"], Options { once: true, dry_run: true })]
    fn parses_flags(#[case] raw: &[&str], #[case] expected: Options) {
        let parsed = Options::parse(args(raw)).expect("flags should parse");
        assert_eq!(parsed, expected);
    }

    #[rstest]
    fn rejects_unknown_flags() {
        let err = Options::parse(args(&["--forever"])).expect_err("unknown flag");
        assert!(matches!(err, SweeperError::InvalidArgs(message) if message.contains("--forever")));
    }
}
