//! Error types for lease domain validation and parsing.

use super::{DaemonId, JobId, JobStatus, ProjectId, ProjectStage};
use thiserror::Error;

/// Errors returned while validating lease domain values and transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaseDomainError {
    /// The daemon identifier is empty after trimming.
    #[error("daemon identifier must not be empty")]
    EmptyDaemonId,

    /// The daemon identifier contains whitespace or exceeds the storage limit.
    #[error("invalid daemon identifier '{0}'")]
    InvalidDaemonId(String),

    /// The job is owned by a different daemon than the caller.
    #[error("job {job_id} is owned by daemon {owner}, not {caller}")]
    JobOwnedByOtherDaemon {
        /// Job identifier.
        job_id: JobId,
        /// Daemon currently owning the job.
        owner: DaemonId,
        /// Daemon that attempted the operation.
        caller: DaemonId,
    },

    /// The project is locked by a different daemon than the caller.
    #[error("project {project_id} is locked by daemon {owner}, not {caller}")]
    ProjectLockedByOtherDaemon {
        /// Project identifier.
        project_id: ProjectId,
        /// Daemon currently holding the project lock.
        owner: DaemonId,
        /// Daemon that attempted the operation.
        caller: DaemonId,
    },

    /// Workers may only report `running`, `done`, `failed`, or `paused`.
    #[error("job status {0} cannot be reported by a worker")]
    UnreportableStatus(JobStatus),

    /// The requested job status change does not start from a legal state.
    #[error("invalid job status transition for {job_id}: {from} -> {to}")]
    InvalidStatusTransition {
        /// Job identifier.
        job_id: JobId,
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },

    /// The project stage cannot change from a terminal stage.
    #[error("invalid project stage change for {project_id}: {from} -> {to}")]
    InvalidStageChange {
        /// Project identifier.
        project_id: ProjectId,
        /// Current stage.
        from: ProjectStage,
        /// Requested stage.
        to: ProjectStage,
    },

    /// Sweep time-to-live must be strictly positive.
    #[error("sweep ttl must be positive")]
    NonPositiveSweepTtl,

    /// Sweep time-to-live exceeds the accepted maximum.
    #[error("sweep ttl must not exceed {max} days", max = super::SweepRequest::MAX_TTL_DAYS)]
    SweepTtlTooLong,

    /// Sweep limit is outside the accepted range.
    #[error("sweep limit {0} must be between 1 and {max}", max = super::SweepRequest::MAX_LIMIT)]
    InvalidSweepLimit(usize),
}

/// Error returned while parsing job statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);

/// Error returned while parsing job types from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown job type: {0}")]
pub struct ParseJobTypeError(pub String);

/// Error returned while parsing project stages from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown project stage: {0}")]
pub struct ParseProjectStageError(pub String);
