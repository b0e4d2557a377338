//! Store port for project locks and job leases.
//!
//! Every mutating method is a conditional write: it checks the expected prior
//! state and applies all of its field changes together, or none of them.

use crate::lease::domain::{
    ClaimOutcome, DaemonId, ForcedRelease, Job, JobId, JobStatus, JobType, Project, ProjectId,
    ProjectStage, ReportPlan,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for lease store operations.
pub type LeaseStoreResult<T> = Result<T, LeaseStoreError>;

/// Job and project status change produced by a worker report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusChange {
    /// Job receiving the report.
    pub job_id: JobId,
    /// Project whose lock may be released.
    pub project_id: ProjectId,
    /// Reporting daemon.
    pub daemon_id: DaemonId,
    /// Planned job write.
    pub plan: ReportPlan,
    /// Time of the report.
    pub at: DateTime<Utc>,
}

/// Outcome of applying a [`JobStatusChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatusChangeOutcome {
    /// Whether the job still matched the expected prior state.
    pub applied: bool,
    /// Whether the reporter's project lock was released.
    pub lock_released: bool,
}

/// Selection of jobs whose leases look abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleLeaseQuery {
    /// Jobs with a progress timestamp strictly before this instant are stale.
    pub cutoff: DateTime<Utc>,
    /// Statuses eligible for sweeping.
    pub statuses: Vec<JobStatus>,
    /// Optional project filter.
    pub project_id: Option<ProjectId>,
    /// Selection cap.
    pub limit: usize,
}

/// Lease persistence contract.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Stores a new project.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseStoreError::DuplicateProject`] when the identifier exists.
    async fn store_project(&self, project: &Project) -> LeaseStoreResult<()>;

    /// Finds a project by identifier.
    async fn find_project(&self, id: ProjectId) -> LeaseStoreResult<Option<Project>>;

    /// Moves a project from `expected` to `target`.
    ///
    /// Returns `false` when the project is no longer in `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseStoreError::ProjectNotFound`] when the project does not
    /// exist.
    async fn change_project_stage(
        &self,
        id: ProjectId,
        expected: ProjectStage,
        target: ProjectStage,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<bool>;

    /// Stores a new job.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseStoreError::DuplicateJob`] when the identifier exists or
    /// [`LeaseStoreError::ProjectNotFound`] when the project does not.
    async fn store_job(&self, job: &Job) -> LeaseStoreResult<()>;

    /// Finds a job by identifier.
    async fn find_job(&self, id: JobId) -> LeaseStoreResult<Option<Job>>;

    /// Atomically claims a queued job and locks its project for `daemon_id`.
    ///
    /// Eligibility is re-evaluated inside the write; a rejected claim writes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseStoreError::JobNotFound`] or
    /// [`LeaseStoreError::ProjectNotFound`] for dangling references.
    async fn try_claim(
        &self,
        job_id: JobId,
        daemon_id: &DaemonId,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<ClaimOutcome>;

    /// Applies a planned report and, when the plan ends the lease, releases
    /// the project lock if the reporter still holds it.
    async fn apply_status_change(
        &self,
        change: &JobStatusChange,
    ) -> LeaseStoreResult<JobStatusChangeOutcome>;

    /// Lists queued jobs claimable by `daemon_id`, oldest first.
    async fn list_claimable(&self, daemon_id: &DaemonId, limit: usize)
    -> LeaseStoreResult<Vec<Job>>;

    /// Returns whether the project has a queued or running job of `job_type`.
    async fn has_active_job(
        &self,
        project_id: ProjectId,
        job_type: JobType,
    ) -> LeaseStoreResult<bool>;

    /// Lists jobs matching a stale lease query, stalest first.
    async fn find_stale(&self, query: &StaleLeaseQuery) -> LeaseStoreResult<Vec<Job>>;

    /// Fails a stale job if its status and progress timestamp are unchanged
    /// since it was selected.
    ///
    /// Returns whether the job was failed.
    async fn fail_stale(
        &self,
        job: &Job,
        reason: &str,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<bool>;

    /// Returns a paused job to the queue and yields the row as written.
    ///
    /// Returns `None` when the job is not paused.
    async fn requeue_paused(
        &self,
        job_id: JobId,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<Option<Job>>;

    /// Clears a project lock when no job of the project is running.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseStoreError::ProjectNotFound`] when the project does not
    /// exist.
    async fn force_release_lock(
        &self,
        project_id: ProjectId,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<ForcedRelease>;
}

/// Errors returned by lease store implementations.
#[derive(Debug, Clone, Error)]
pub enum LeaseStoreError {
    /// A project with the same identifier already exists.
    #[error("duplicate project identifier: {0}")]
    DuplicateProject(ProjectId),

    /// A job with the same identifier already exists.
    #[error("duplicate job identifier: {0}")]
    DuplicateJob(JobId),

    /// The project was not found.
    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    /// The job was not found.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl LeaseStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
