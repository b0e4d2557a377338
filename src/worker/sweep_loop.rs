//! Fixed-interval loop around the stale lease sweeper.

use crate::lease::{
    domain::SweepRequest,
    ports::LeaseStore,
    services::{StaleLeaseSweeper, SweepError, SweepReport},
};
use mockable::Clock;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Runs a sweep on a fixed interval.
pub struct SweepLoop<S, C>
where
    S: LeaseStore,
    C: Clock + Send + Sync,
{
    sweeper: StaleLeaseSweeper<S, C>,
    request: SweepRequest,
    interval: Duration,
}

impl<S, C> SweepLoop<S, C>
where
    S: LeaseStore,
    C: Clock + Send + Sync,
{
    /// Creates a sweep loop.
    #[must_use]
    pub const fn new(
        sweeper: StaleLeaseSweeper<S, C>,
        request: SweepRequest,
        interval: Duration,
    ) -> Self {
        Self {
            sweeper,
            request,
            interval,
        }
    }

    /// Runs a single sweep.
    ///
    /// # Errors
    ///
    /// Returns the sweeper's error.
    pub async fn run_once(&self) -> Result<SweepReport, SweepError> {
        self.sweeper.sweep(&self.request).await
    }

    /// Sweeps every interval until `shutdown` carries `true`.
    ///
    /// Returns the number of passes that completed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut passes = 0_usize;
        info!(interval_secs = self.interval.as_secs(), "sweep loop started");
        while !*shutdown.borrow() {
            match self.run_once().await {
                Ok(report) => {
                    passes = passes.saturating_add(1);
                    if !report.candidates.is_empty() {
                        info!(
                            candidates = report.candidates.len(),
                            swept = report.swept.len(),
                            skipped = report.skipped(),
                            dry_run = report.dry_run,
                            "sweep pass finished"
                        );
                    }
                }
                Err(err) => warn!(error = %err, "sweep pass failed"),
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.interval) => {}
            }
        }
        info!(passes, "sweep loop stopped");
        passes
    }
}
