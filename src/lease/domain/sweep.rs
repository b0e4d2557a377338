//! Parameters for stale lease sweeps.

use super::{JobStatus, LeaseDomainError, ProjectId};
use chrono::{DateTime, TimeDelta, Utc};

/// Selection and mode of a stale lease sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepRequest {
    ttl: TimeDelta,
    limit: usize,
    include_queued: bool,
    dry_run: bool,
    project_id: Option<ProjectId>,
}

impl SweepRequest {
    /// Default number of jobs inspected per sweep.
    pub const DEFAULT_LIMIT: usize = 100;

    /// Largest accepted sweep limit.
    pub const MAX_LIMIT: usize = 1_000;

    /// Longest accepted ttl, in days.
    pub const MAX_TTL_DAYS: i64 = 365;

    /// Creates a sweep of running jobs idle for longer than `ttl`.
    #[must_use]
    pub const fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            limit: Self::DEFAULT_LIMIT,
            include_queued: false,
            dry_run: false,
            project_id: None,
        }
    }

    /// Caps the number of jobs selected.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Also selects queued jobs that have sat idle past the ttl.
    #[must_use]
    pub const fn including_queued(mut self, include_queued: bool) -> Self {
        self.include_queued = include_queued;
        self
    }

    /// Reports candidates without failing them.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Restricts the sweep to one project.
    #[must_use]
    pub const fn for_project(mut self, project_id: ProjectId) -> Self {
        self.project_id = Some(project_id);
        self
    }

    /// Returns the idle time after which a lease counts as stale.
    #[must_use]
    pub const fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// Returns the selection cap.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Returns whether queued jobs are selected too.
    #[must_use]
    pub const fn includes_queued(&self) -> bool {
        self.include_queued
    }

    /// Returns whether the sweep is read-only.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Returns the project filter.
    #[must_use]
    pub const fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    /// Returns the statuses a stale job may have.
    #[must_use]
    pub fn statuses(&self) -> Vec<JobStatus> {
        if self.include_queued {
            vec![JobStatus::Running, JobStatus::Queued]
        } else {
            vec![JobStatus::Running]
        }
    }

    /// Returns the progress timestamp before which a job is stale.
    ///
    /// Saturates at the earliest representable instant.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Validates the request bounds.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseDomainError::NonPositiveSweepTtl`],
    /// [`LeaseDomainError::SweepTtlTooLong`], or
    /// [`LeaseDomainError::InvalidSweepLimit`].
    pub fn validate(&self) -> Result<(), LeaseDomainError> {
        if self.ttl <= TimeDelta::zero() {
            return Err(LeaseDomainError::NonPositiveSweepTtl);
        }
        if self.ttl > TimeDelta::days(Self::MAX_TTL_DAYS) {
            return Err(LeaseDomainError::SweepTtlTooLong);
        }
        if self.limit == 0 || self.limit > Self::MAX_LIMIT {
            return Err(LeaseDomainError::InvalidSweepLimit(self.limit));
        }
        Ok(())
    }
}
