//! Polling loop that claims jobs, runs them, and reports the result.

use super::Backoff;
use crate::lease::{
    domain::{ClaimedJob, DaemonId, JobStatus},
    ports::LeaseStore,
    services::{JobLeaseResult, JobLeaseService},
};
use async_trait::async_trait;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const MIN_HEARTBEAT: Duration = Duration::from_millis(1);

/// Final state a handler reached for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobHandlerOutcome {
    /// The work finished.
    Done,
    /// The work failed with a reason.
    Failed(String),
    /// The work needs outside input before it can continue.
    Paused,
}

impl JobHandlerOutcome {
    /// Returns the job status reported for this outcome.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        match self {
            Self::Done => JobStatus::Done,
            Self::Failed(_) => JobStatus::Failed,
            Self::Paused => JobStatus::Paused,
        }
    }
}

/// Performs the work of a claimed job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs the job to a terminal or paused outcome.
    async fn handle(&self, job: &ClaimedJob) -> JobHandlerOutcome;
}

/// Counters for one poll pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Jobs claimed in this pass.
    pub claimed: usize,
    /// Jobs whose outcome was reported.
    pub reported: usize,
    /// Jobs whose report failed.
    pub report_errors: usize,
}

/// Poll settings for a [`JobWorkerLoop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLoopSettings {
    /// Identity the loop claims under.
    pub daemon_id: DaemonId,
    /// Jobs claimed per pass.
    pub batch_size: usize,
    /// Delay after the first idle or failed pass.
    pub poll_interval: Duration,
    /// Upper bound for the idle delay.
    pub max_backoff: Duration,
    /// Gap between `running` reports while a handler works on a job.
    ///
    /// Must stay below the sweep ttl or long jobs are failed as stale.
    pub heartbeat_interval: Duration,
}

/// Claims batches of jobs for one daemon and drives them through a handler.
pub struct JobWorkerLoop<S, C, H>
where
    S: LeaseStore,
    C: Clock + Send + Sync,
    H: JobHandler,
{
    service: JobLeaseService<S, C>,
    handler: Arc<H>,
    settings: JobLoopSettings,
}

impl<S, C, H> JobWorkerLoop<S, C, H>
where
    S: LeaseStore,
    C: Clock + Send + Sync,
    H: JobHandler,
{
    /// Creates a worker loop.
    #[must_use]
    pub const fn new(
        service: JobLeaseService<S, C>,
        handler: Arc<H>,
        settings: JobLoopSettings,
    ) -> Self {
        Self {
            service,
            handler,
            settings,
        }
    }

    /// Claims one batch and reports every handled job.
    ///
    /// Each job is heartbeated while its handler runs. A failed report is
    /// logged and counted; the rest of the batch still runs.
    ///
    /// # Errors
    ///
    /// Returns the claim error when the batch cannot be claimed.
    pub async fn run_once(&self) -> JobLeaseResult<PollSummary> {
        let daemon_id = &self.settings.daemon_id;
        let batch = self
            .service
            .claim_batch(daemon_id, self.settings.batch_size)
            .await?;
        let mut summary = PollSummary {
            claimed: batch.len(),
            ..PollSummary::default()
        };
        for job in &batch {
            let outcome = self.handle_with_heartbeat(job).await;
            if let JobHandlerOutcome::Failed(reason) = &outcome {
                warn!(job_id = %job.id, daemon_id = %daemon_id, reason = %reason, "job handler failed");
            }
            match self
                .service
                .report_status(job.id, daemon_id, outcome.status())
                .await
            {
                Ok(_) => summary.reported = summary.reported.saturating_add(1),
                Err(err) => {
                    warn!(job_id = %job.id, daemon_id = %daemon_id, error = %err, "job report failed");
                    summary.report_errors = summary.report_errors.saturating_add(1);
                }
            }
        }
        Ok(summary)
    }

    async fn handle_with_heartbeat(&self, job: &ClaimedJob) -> JobHandlerOutcome {
        let daemon_id = &self.settings.daemon_id;
        let period = self.settings.heartbeat_interval.max(MIN_HEARTBEAT);
        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let handling = self.handler.handle(job);
        tokio::pin!(handling);
        loop {
            tokio::select! {
                biased;
                outcome = &mut handling => return outcome,
                _ = heartbeat.tick() => {
                    match self.service.report_status(job.id, daemon_id, JobStatus::Running).await {
                        Ok(_) => debug!(job_id = %job.id, daemon_id = %daemon_id, "job heartbeat sent"),
                        Err(err) => {
                            warn!(job_id = %job.id, daemon_id = %daemon_id, error = %err, "job heartbeat failed");
                        }
                    }
                }
            }
        }
    }

    /// Polls until `shutdown` carries `true`.
    ///
    /// A pass that claims work is followed immediately by the next one; idle
    /// and failed passes back off exponentially.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.settings.poll_interval, self.settings.max_backoff);
        info!(daemon_id = %self.settings.daemon_id, "job worker loop started");
        while !*shutdown.borrow() {
            let delay = match self.run_once().await {
                Ok(summary) if summary.claimed > 0 => {
                    backoff.reset();
                    Duration::ZERO
                }
                Ok(_) => {
                    let idle = backoff.next_delay();
                    debug!(daemon_id = %self.settings.daemon_id, delay = ?idle, "no claimable jobs");
                    idle
                }
                Err(err) => {
                    let retry = backoff.next_delay();
                    warn!(daemon_id = %self.settings.daemon_id, error = %err, delay = ?retry, "job poll failed");
                    retry
                }
            };
            if delay.is_zero() {
                continue;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
        info!(daemon_id = %self.settings.daemon_id, "job worker loop stopped");
    }
}
