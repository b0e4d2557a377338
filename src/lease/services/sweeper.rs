//! Stale lease sweeper.
//!
//! Fails jobs whose progress timestamp has not moved within the TTL. The
//! sweeper never requeues work and never touches project locks; a lock left
//! by a dead daemon is cleared by that daemon claiming again or by
//! `JobLeaseService::force_release_project_lock`.

use crate::lease::{
    domain::{DaemonId, Job, JobId, LeaseDomainError, SweepRequest},
    ports::{LeaseStore, LeaseStoreError, StaleLeaseQuery},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned by [`StaleLeaseSweeper`].
#[derive(Debug, Error)]
pub enum SweepError {
    /// The sweep request is out of bounds.
    #[error(transparent)]
    Domain(#[from] LeaseDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] LeaseStoreError),
}

/// Outcome of one sweep pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Whether the pass ran without writing.
    pub dry_run: bool,
    /// Jobs selected as stale, stalest first, as seen before any write.
    pub candidates: Vec<Job>,
    /// Jobs actually failed by this pass.
    pub swept: Vec<JobId>,
}

impl SweepReport {
    /// Returns candidates that were skipped because they changed after
    /// selection. Always empty for dry runs.
    #[must_use]
    pub fn skipped(&self) -> usize {
        if self.dry_run {
            0
        } else {
            self.candidates.len().saturating_sub(self.swept.len())
        }
    }
}

/// Sweeps abandoned job leases.
#[derive(Clone)]
pub struct StaleLeaseSweeper<S, C>
where
    S: LeaseStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> StaleLeaseSweeper<S, C>
where
    S: LeaseStore,
    C: Clock + Send + Sync,
{
    /// Creates a sweeper over `store`.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Runs one sweep pass.
    ///
    /// # Errors
    ///
    /// Returns [`SweepError::Domain`] for an invalid request and
    /// [`SweepError::Store`] when the store fails.
    pub async fn sweep(&self, request: &SweepRequest) -> Result<SweepReport, SweepError> {
        request.validate()?;
        let now = self.clock.utc();
        let query = StaleLeaseQuery {
            cutoff: request.cutoff(now),
            statuses: request.statuses(),
            project_id: request.project_id(),
            limit: request.limit(),
        };
        let candidates = self.store.find_stale(&query).await?;
        if candidates.is_empty() {
            debug!(cutoff = %query.cutoff, "no stale leases");
        }

        if request.is_dry_run() {
            info!(candidates = candidates.len(), "dry-run sweep; nothing written");
            return Ok(SweepReport {
                dry_run: true,
                candidates,
                swept: Vec::new(),
            });
        }

        let reason = format!(
            "lease expired: no progress for more than {} seconds",
            request.ttl().num_seconds()
        );
        let mut swept = Vec::with_capacity(candidates.len());
        for job in &candidates {
            if self.store.fail_stale(job, &reason, now).await? {
                warn!(
                    job_id = %job.id(),
                    project_id = %job.project_id(),
                    daemon_id = job.daemon_id().map_or("", DaemonId::as_str),
                    last_progress = %job.updated_at(),
                    "stale lease failed"
                );
                swept.push(job.id());
            } else {
                debug!(job_id = %job.id(), "stale candidate changed since selection; skipped");
            }
        }
        if !swept.is_empty() {
            info!(swept = swept.len(), candidates = candidates.len(), "sweep complete");
        }
        Ok(SweepReport {
            dry_run: false,
            candidates,
            swept,
        })
    }
}
