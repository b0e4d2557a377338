//! Job lease manager: claims, reports, and project orchestration.

use crate::lease::{
    domain::{
        ClaimOutcome, ClaimedJob, DaemonId, ForcedRelease, Job, JobId, JobStatus, JobType,
        LeaseDomainError, Project, ProjectId, ProjectStage,
    },
    ports::{JobStatusChange, LeaseStore, LeaseStoreError},
};
use mockable::Clock;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Candidates fetched per requested batch slot, so one-per-project filtering
/// still fills the batch when a project has several queued jobs.
const CANDIDATE_FACTOR: usize = 4;

/// Reports applied before a concurrent update is surfaced to the caller.
const REPORT_ATTEMPTS: usize = 2;

/// Service-level errors for lease operations.
#[derive(Debug, Error)]
pub enum JobLeaseError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] LeaseDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(LeaseStoreError),
    /// The project does not exist.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),
    /// The job does not exist.
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    /// A queued or running job of the same type already exists.
    #[error("project {project_id} already has an active {job_type} job")]
    DuplicateActiveJob {
        /// Project identifier.
        project_id: ProjectId,
        /// Job type requested.
        job_type: JobType,
    },
    /// The job kept changing underneath the report.
    #[error("job {0} changed concurrently; report not applied")]
    ConcurrentUpdate(JobId),
    /// The project stage changed underneath the request.
    #[error("project {0} changed concurrently; stage not applied")]
    ConcurrentStageChange(ProjectId),
    /// The lock cannot be released while a job of the project runs.
    #[error("project {project_id} still has running job {job_id}")]
    ProjectJobRunning {
        /// Project identifier.
        project_id: ProjectId,
        /// Job still running.
        job_id: JobId,
    },
}

impl JobLeaseError {
    /// Returns whether the error is an ownership conflict between daemons.
    #[must_use]
    pub const fn is_ownership_conflict(&self) -> bool {
        matches!(
            self,
            Self::Domain(
                LeaseDomainError::JobOwnedByOtherDaemon { .. }
                    | LeaseDomainError::ProjectLockedByOtherDaemon { .. }
            )
        )
    }
}

impl From<LeaseStoreError> for JobLeaseError {
    fn from(err: LeaseStoreError) -> Self {
        match err {
            LeaseStoreError::ProjectNotFound(id) => Self::ProjectNotFound(id),
            LeaseStoreError::JobNotFound(id) => Self::JobNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Result type for lease service operations.
pub type JobLeaseResult<T> = Result<T, JobLeaseError>;

/// Result of an accepted status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportReceipt {
    /// Job after the report.
    pub job: Job,
    /// Whether the reporter's project lock was released.
    pub lock_released: bool,
}

/// Lease orchestration service.
#[derive(Clone)]
pub struct JobLeaseService<S, C>
where
    S: LeaseStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> JobLeaseService<S, C>
where
    S: LeaseStore,
    C: Clock + Send + Sync,
{
    /// Creates a new lease service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Creates a project in `draft`.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::Store`] when persistence fails.
    pub async fn create_project(&self) -> JobLeaseResult<Project> {
        let project = Project::new(&*self.clock);
        self.store.store_project(&project).await?;
        info!(project_id = %project.id(), "project created");
        Ok(project)
    }

    /// Moves a project to `stage` without touching its lock.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::ProjectNotFound`], a domain error when the
    /// project is already terminal or in `stage`, or
    /// [`JobLeaseError::ConcurrentStageChange`] when the stage moved between
    /// read and write.
    pub async fn advance_stage(
        &self,
        project_id: ProjectId,
        stage: ProjectStage,
    ) -> JobLeaseResult<Project> {
        let project = self.load_project(project_id).await?;
        project.ensure_can_move_to(stage)?;
        let changed = self
            .store
            .change_project_stage(project_id, project.stage(), stage, self.clock.utc())
            .await?;
        if !changed {
            return Err(JobLeaseError::ConcurrentStageChange(project_id));
        }
        info!(project_id = %project_id, from = %project.stage(), to = %stage, "project stage changed");
        self.load_project(project_id).await
    }

    /// Marks a project as cancelled. Running jobs are left to finish or be
    /// swept.
    ///
    /// # Errors
    ///
    /// See [`Self::advance_stage`].
    pub async fn cancel_project(&self, project_id: ProjectId) -> JobLeaseResult<Project> {
        self.advance_stage(project_id, ProjectStage::Cancelled).await
    }

    /// Queues a new job unless one of the same type is already active.
    ///
    /// When `caller` is given, the check also fails if another daemon holds
    /// the project lock.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::DuplicateActiveJob`],
    /// [`JobLeaseError::ProjectNotFound`], an ownership conflict, or a store
    /// error.
    pub async fn enqueue_job(
        &self,
        project_id: ProjectId,
        job_type: JobType,
        payload: Value,
        caller: Option<&DaemonId>,
    ) -> JobLeaseResult<Job> {
        let active = match caller {
            Some(daemon_id) => {
                self.project_has_active_job(project_id, job_type, daemon_id)
                    .await?
            }
            None => {
                self.load_project(project_id).await?;
                self.store.has_active_job(project_id, job_type).await?
            }
        };
        if active {
            return Err(JobLeaseError::DuplicateActiveJob {
                project_id,
                job_type,
            });
        }

        let job = Job::new(project_id, job_type, payload, &*self.clock);
        self.store.store_job(&job).await?;
        info!(job_id = %job.id(), project_id = %project_id, job_type = %job_type, "job queued");
        Ok(job)
    }

    /// Attempts to lease one job to `daemon_id`.
    ///
    /// A rejection is a normal outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::JobNotFound`] or a store error.
    pub async fn claim(&self, job_id: JobId, daemon_id: &DaemonId) -> JobLeaseResult<ClaimOutcome> {
        let outcome = self
            .store
            .try_claim(job_id, daemon_id, self.clock.utc())
            .await?;
        match &outcome {
            ClaimOutcome::Claimed(job) => info!(
                job_id = %job_id,
                project_id = %job.project_id(),
                daemon_id = %daemon_id,
                "job claimed"
            ),
            ClaimOutcome::Rejected(reason) => debug!(
                job_id = %job_id,
                daemon_id = %daemon_id,
                %reason,
                "claim rejected"
            ),
        }
        Ok(outcome)
    }

    /// Claims up to `batch_size` jobs, oldest first, at most one per project.
    ///
    /// # Errors
    ///
    /// Returns a store error when listing or claiming fails.
    pub async fn claim_batch(
        &self,
        daemon_id: &DaemonId,
        batch_size: usize,
    ) -> JobLeaseResult<Vec<ClaimedJob>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let candidates = self
            .store
            .list_claimable(daemon_id, batch_size.saturating_mul(CANDIDATE_FACTOR))
            .await?;

        let mut visited = HashSet::new();
        let mut claimed = Vec::with_capacity(batch_size);
        for candidate in candidates {
            if claimed.len() == batch_size {
                break;
            }
            if !visited.insert(candidate.project_id()) {
                continue;
            }
            match self.claim(candidate.id(), daemon_id).await {
                Ok(ClaimOutcome::Claimed(job)) => claimed.push(ClaimedJob::from(&job)),
                Ok(ClaimOutcome::Rejected(_)) | Err(JobLeaseError::JobNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(claimed)
    }

    /// Applies a worker status report.
    ///
    /// A `running` report on a job running under the same daemon is a
    /// heartbeat. `done`, `failed`, and `paused` end the lease and release the
    /// reporter's project lock when it still holds it. Repeating the status
    /// the job already has changes nothing on the job.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::JobNotFound`], a domain error for ownership
    /// conflicts and illegal transitions, or
    /// [`JobLeaseError::ConcurrentUpdate`] when the job keeps changing
    /// underneath the report.
    pub async fn report_status(
        &self,
        job_id: JobId,
        daemon_id: &DaemonId,
        status: JobStatus,
    ) -> JobLeaseResult<ReportReceipt> {
        for _ in 0..REPORT_ATTEMPTS {
            let mut job = self.load_job(job_id).await?;
            let plan = job.plan_report(daemon_id, status).inspect_err(|err| {
                warn!(job_id = %job_id, daemon_id = %daemon_id, error = %err, "report rejected");
            })?;
            let change = JobStatusChange {
                job_id,
                project_id: job.project_id(),
                daemon_id: daemon_id.clone(),
                plan,
                at: self.clock.utc(),
            };
            let outcome = self.store.apply_status_change(&change).await?;
            if !outcome.applied {
                continue;
            }

            job.apply_report(plan, change.at);
            if outcome.lock_released {
                info!(
                    job_id = %job_id,
                    project_id = %job.project_id(),
                    daemon_id = %daemon_id,
                    status = %status,
                    "job finished; project lock released"
                );
            } else {
                debug!(job_id = %job_id, daemon_id = %daemon_id, status = %status, "job report applied");
            }
            return Ok(ReportReceipt {
                job,
                lock_released: outcome.lock_released,
            });
        }
        Err(JobLeaseError::ConcurrentUpdate(job_id))
    }

    /// Lists queued jobs `daemon_id` could claim, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error when the query fails.
    pub async fn list_claimable_queue(
        &self,
        daemon_id: &DaemonId,
        limit: usize,
    ) -> JobLeaseResult<Vec<Job>> {
        Ok(self.store.list_claimable(daemon_id, limit).await?)
    }

    /// Returns whether the project has a queued or running job of `job_type`.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::ProjectNotFound`] or an ownership conflict
    /// when another daemon holds the project lock.
    pub async fn project_has_active_job(
        &self,
        project_id: ProjectId,
        job_type: JobType,
        caller: &DaemonId,
    ) -> JobLeaseResult<bool> {
        let project = self.load_project(project_id).await?;
        project.ensure_not_locked_by_other(caller)?;
        Ok(self.store.has_active_job(project_id, job_type).await?)
    }

    /// Returns a paused job to the queue without an owner.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::JobNotFound`] or
    /// [`LeaseDomainError::InvalidStatusTransition`] when the job is not
    /// paused.
    pub async fn requeue_job(&self, job_id: JobId) -> JobLeaseResult<Job> {
        let Some(job) = self.store.requeue_paused(job_id, self.clock.utc()).await? else {
            let current = self.load_job(job_id).await?;
            return Err(LeaseDomainError::InvalidStatusTransition {
                job_id,
                from: current.status(),
                to: JobStatus::Queued,
            }
            .into());
        };
        info!(job_id = %job_id, project_id = %job.project_id(), "job requeued");
        Ok(job)
    }

    /// Clears a project lock left behind by a daemon that went away.
    ///
    /// Returns the previous holder, or `None` when the project was unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::ProjectJobRunning`] while a job of the project
    /// is running, or [`JobLeaseError::ProjectNotFound`].
    pub async fn force_release_project_lock(
        &self,
        project_id: ProjectId,
    ) -> JobLeaseResult<Option<DaemonId>> {
        match self
            .store
            .force_release_lock(project_id, self.clock.utc())
            .await?
        {
            ForcedRelease::Released(previous) => {
                warn!(project_id = %project_id, daemon_id = %previous, "project lock force-released");
                Ok(Some(previous))
            }
            ForcedRelease::NotLocked => Ok(None),
            ForcedRelease::JobStillRunning(job_id) => {
                Err(JobLeaseError::ProjectJobRunning { project_id, job_id })
            }
        }
    }

    /// Loads a project.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::ProjectNotFound`] when it does not exist.
    pub async fn load_project(&self, project_id: ProjectId) -> JobLeaseResult<Project> {
        self.store
            .find_project(project_id)
            .await?
            .ok_or(JobLeaseError::ProjectNotFound(project_id))
    }

    /// Loads a job.
    ///
    /// # Errors
    ///
    /// Returns [`JobLeaseError::JobNotFound`] when it does not exist.
    pub async fn load_job(&self, job_id: JobId) -> JobLeaseResult<Job> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or(JobLeaseError::JobNotFound(job_id))
    }
}
