//! Job aggregate and its status lifecycle.

use super::{DaemonId, JobId, JobType, LeaseDomainError, ParseJobStatusError, ProjectId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the backlog for a daemon to claim it.
    Queued,
    /// Claimed and being worked on by its owning daemon.
    Running,
    /// Finished successfully.
    Done,
    /// Finished unsuccessfully, or reclaimed by the sweeper.
    Failed,
    /// Released by its daemon without finishing.
    Paused,
}

impl JobStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }

    /// Returns whether the job still represents pending or in-flight work.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Returns whether entering this status releases the project lock.
    #[must_use]
    pub const fn releases_lock(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Paused)
    }

    /// Returns whether a worker may report this status.
    #[must_use]
    pub const fn is_reportable(self) -> bool {
        !matches!(self, Self::Queued)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = ParseJobStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            _ => Err(ParseJobStatusError(value.to_owned())),
        }
    }
}

/// Write required to apply a worker status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPlan {
    /// The job keeps running; only its progress timestamp moves.
    Heartbeat,
    /// The job moves from `from` to `to`.
    Transition {
        /// Status the job must still have when the write lands.
        from: JobStatus,
        /// Reported status.
        to: JobStatus,
    },
    /// The job already has the reported status.
    Unchanged(JobStatus),
}

impl ReportPlan {
    /// Returns the status the job has once the plan is applied.
    #[must_use]
    pub const fn resulting_status(self) -> JobStatus {
        match self {
            Self::Heartbeat => JobStatus::Running,
            Self::Transition { to, .. } => to,
            Self::Unchanged(status) => status,
        }
    }

    /// Returns whether applying the plan should release the reporter's lock.
    ///
    /// Only a transition into a lease-ending status releases it. A repeated
    /// report was already applied once and must not touch a lock the daemon
    /// may have taken again for another job.
    #[must_use]
    pub const fn releases_lock(self) -> bool {
        match self {
            Self::Transition { to, .. } => to.releases_lock(),
            Self::Heartbeat | Self::Unchanged(_) => false,
        }
    }
}

/// Job aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    project_id: ProjectId,
    job_type: JobType,
    status: JobStatus,
    daemon_id: Option<DaemonId>,
    payload: Value,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedJobData {
    /// Persisted job identifier.
    pub id: JobId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Persisted job type.
    pub job_type: JobType,
    /// Persisted lifecycle status.
    pub status: JobStatus,
    /// Owning daemon, if claimed.
    pub daemon_id: Option<DaemonId>,
    /// Worker payload.
    pub payload: Value,
    /// Failure reason recorded by the sweeper.
    pub failure_reason: Option<String>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted progress timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a queued job for the given project stage.
    #[must_use]
    pub fn new(project_id: ProjectId, job_type: JobType, payload: Value, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: JobId::new(),
            project_id,
            job_type,
            status: JobStatus::Queued,
            daemon_id: None,
            payload,
            failure_reason: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a job from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedJobData) -> Self {
        Self {
            id: data.id,
            project_id: data.project_id,
            job_type: data.job_type,
            status: data.status,
            daemon_id: data.daemon_id,
            payload: data.payload,
            failure_reason: data.failure_reason,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Returns the owning project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the job type.
    #[must_use]
    pub const fn job_type(&self) -> JobType {
        self.job_type
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Returns the owning daemon, if the job has been claimed.
    #[must_use]
    pub const fn daemon_id(&self) -> Option<&DaemonId> {
        self.daemon_id.as_ref()
    }

    /// Returns the worker payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the failure reason recorded by the sweeper, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest progress timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether `daemon_id` may claim this job.
    ///
    /// A job keeps the daemon it was first claimed by; only an unowned job or
    /// one already owned by the same daemon is claimable.
    #[must_use]
    pub fn is_claimable_by(&self, daemon_id: &DaemonId) -> bool {
        self.status == JobStatus::Queued
            && self.daemon_id.as_ref().is_none_or(|owner| owner == daemon_id)
    }

    /// Fails with an ownership conflict when another daemon owns the job.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseDomainError::JobOwnedByOtherDaemon`] when the job is
    /// owned by a daemon other than `caller`.
    pub fn ensure_owned_by(&self, caller: &DaemonId) -> Result<(), LeaseDomainError> {
        match &self.daemon_id {
            Some(owner) if owner != caller => Err(LeaseDomainError::JobOwnedByOtherDaemon {
                job_id: self.id,
                owner: owner.clone(),
                caller: caller.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Decides how a status report from `caller` applies to this job.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseDomainError::JobOwnedByOtherDaemon`] on ownership
    /// conflicts, [`LeaseDomainError::UnreportableStatus`] for `queued`, and
    /// [`LeaseDomainError::InvalidStatusTransition`] when the report does not
    /// start from a legal state.
    pub fn plan_report(
        &self,
        caller: &DaemonId,
        reported: JobStatus,
    ) -> Result<ReportPlan, LeaseDomainError> {
        self.ensure_owned_by(caller)?;
        if !reported.is_reportable() {
            return Err(LeaseDomainError::UnreportableStatus(reported));
        }

        match (self.status, reported) {
            (JobStatus::Running, JobStatus::Running) => Ok(ReportPlan::Heartbeat),
            (JobStatus::Running, to) => Ok(ReportPlan::Transition {
                from: JobStatus::Running,
                to,
            }),
            (current, to) if current == to => Ok(ReportPlan::Unchanged(current)),
            (from, to) => Err(LeaseDomainError::InvalidStatusTransition {
                job_id: self.id,
                from,
                to,
            }),
        }
    }

    /// Marks the job as running under `daemon_id`.
    pub(crate) fn mark_claimed(&mut self, daemon_id: &DaemonId, at: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.daemon_id = Some(daemon_id.clone());
        self.updated_at = at;
    }

    /// Applies a planned report.
    pub(crate) fn apply_report(&mut self, plan: ReportPlan, at: DateTime<Utc>) {
        match plan {
            ReportPlan::Heartbeat => self.updated_at = at,
            ReportPlan::Transition { to, .. } => {
                self.status = to;
                self.updated_at = at;
            }
            ReportPlan::Unchanged(_) => {}
        }
    }

    /// Marks an abandoned lease as failed.
    pub(crate) fn mark_stale(&mut self, reason: &str, at: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.failure_reason = Some(reason.to_owned());
        self.updated_at = at;
    }

    /// Returns a paused job to the backlog without an owner.
    pub(crate) fn requeue(&mut self, at: DateTime<Utc>) {
        self.status = JobStatus::Queued;
        self.daemon_id = None;
        self.updated_at = at;
    }
}
