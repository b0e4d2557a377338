//! Claim eligibility rules and outcomes.

use super::{DaemonId, Job, JobId, JobStatus, JobType, Project, ProjectId, ProjectStage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Reason a claim attempt did not take the lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ClaimRejection {
    /// The job is no longer queued.
    JobNotQueued {
        /// Status observed at claim time.
        status: JobStatus,
    },
    /// The job was first claimed by another daemon.
    JobOwnedByOtherDaemon {
        /// Daemon owning the job.
        owner: DaemonId,
    },
    /// The project has moved to a stage that does not run this job type.
    StageMismatch {
        /// Current project stage.
        stage: ProjectStage,
        /// Job type of the rejected job.
        job_type: JobType,
    },
    /// Another daemon holds the project lock.
    ProjectLocked {
        /// Current lock holder.
        owner: DaemonId,
    },
    /// Another job of the project is already running.
    ProjectBusy,
}

impl fmt::Display for ClaimRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JobNotQueued { status } => write!(f, "job is {status}, not queued"),
            Self::JobOwnedByOtherDaemon { owner } => write!(f, "job is owned by {owner}"),
            Self::StageMismatch { stage, job_type } => {
                write!(f, "project stage {stage} does not run {job_type} jobs")
            }
            Self::ProjectLocked { owner } => write!(f, "project is locked by {owner}"),
            Self::ProjectBusy => f.write_str("project already has a running job"),
        }
    }
}

/// Checks whether `daemon_id` may claim `job` for `project` right now.
///
/// `has_running_job` reports whether any job of the project is currently
/// running. Stores call this inside the same atomic section as the write.
///
/// # Errors
///
/// Returns the first [`ClaimRejection`] that applies.
pub fn evaluate_claim(
    project: &Project,
    job: &Job,
    daemon_id: &DaemonId,
    has_running_job: bool,
) -> Result<(), ClaimRejection> {
    if job.status() != JobStatus::Queued {
        return Err(ClaimRejection::JobNotQueued {
            status: job.status(),
        });
    }
    if let Some(owner) = job.daemon_id().filter(|owner| *owner != daemon_id) {
        return Err(ClaimRejection::JobOwnedByOtherDaemon {
            owner: owner.clone(),
        });
    }
    if !project.expects(job.job_type()) {
        return Err(ClaimRejection::StageMismatch {
            stage: project.stage(),
            job_type: job.job_type(),
        });
    }
    if let Some(lock) = project.lock().filter(|lock| lock.daemon_id() != daemon_id) {
        return Err(ClaimRejection::ProjectLocked {
            owner: lock.daemon_id().clone(),
        });
    }
    if has_running_job {
        return Err(ClaimRejection::ProjectBusy);
    }
    Ok(())
}

/// Result of a single claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The lease was taken; carries the job as now running.
    Claimed(Job),
    /// Nothing was written.
    Rejected(ClaimRejection),
}

impl ClaimOutcome {
    /// Returns whether the claim succeeded.
    #[must_use]
    pub const fn claimed(&self) -> bool {
        matches!(self, Self::Claimed(_))
    }

    /// Returns the claimed job, if any.
    #[must_use]
    pub const fn job(&self) -> Option<&Job> {
        match self {
            Self::Claimed(job) => Some(job),
            Self::Rejected(_) => None,
        }
    }

    /// Returns the rejection reason, if any.
    #[must_use]
    pub const fn rejection(&self) -> Option<&ClaimRejection> {
        match self {
            Self::Claimed(_) => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

/// Descriptor handed to a worker for a claimed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedJob {
    /// Job identifier.
    pub id: JobId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Work to perform.
    pub job_type: JobType,
    /// Opaque worker payload.
    pub payload: Value,
}

impl From<&Job> for ClaimedJob {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id(),
            project_id: job.project_id(),
            job_type: job.job_type(),
            payload: job.payload().clone(),
        }
    }
}

/// Result of an operator-initiated lock release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForcedRelease {
    /// The lock was cleared; carries the previous holder.
    Released(DaemonId),
    /// The project was not locked.
    NotLocked,
    /// A job of the project is still running, so the lock was kept.
    JobStillRunning(JobId),
}
