//! Project aggregate and its daemon lock.

use super::{DaemonId, JobType, LeaseDomainError, ProjectId, ProjectStage};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Exclusive ownership of a project by one daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectLock {
    daemon_id: DaemonId,
    locked_at: DateTime<Utc>,
}

impl ProjectLock {
    /// Creates a lock held by `daemon_id` since `locked_at`.
    #[must_use]
    pub const fn new(daemon_id: DaemonId, locked_at: DateTime<Utc>) -> Self {
        Self {
            daemon_id,
            locked_at,
        }
    }

    /// Returns the lock holder.
    #[must_use]
    pub const fn daemon_id(&self) -> &DaemonId {
        &self.daemon_id
    }

    /// Returns when the lock was acquired.
    #[must_use]
    pub const fn locked_at(&self) -> DateTime<Utc> {
        self.locked_at
    }
}

/// Project aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    id: ProjectId,
    stage: ProjectStage,
    lock: Option<ProjectLock>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedProjectData {
    /// Persisted project identifier.
    pub id: ProjectId,
    /// Persisted pipeline stage.
    pub stage: ProjectStage,
    /// Persisted daemon lock, if held.
    pub lock: Option<ProjectLock>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates an unlocked project in [`ProjectStage::Draft`].
    #[must_use]
    pub fn new(clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: ProjectId::new(),
            stage: ProjectStage::Draft,
            lock: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a project from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedProjectData) -> Self {
        Self {
            id: data.id,
            stage: data.stage,
            lock: data.lock,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the project identifier.
    #[must_use]
    pub const fn id(&self) -> ProjectId {
        self.id
    }

    /// Returns the current pipeline stage.
    #[must_use]
    pub const fn stage(&self) -> ProjectStage {
        self.stage
    }

    /// Returns the daemon lock, if held.
    #[must_use]
    pub const fn lock(&self) -> Option<&ProjectLock> {
        self.lock.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether the lock is currently held by `daemon_id`.
    #[must_use]
    pub fn is_locked_by(&self, daemon_id: &DaemonId) -> bool {
        self.lock
            .as_ref()
            .is_some_and(|lock| lock.daemon_id() == daemon_id)
    }

    /// Returns whether `daemon_id` may take or keep the lock.
    #[must_use]
    pub fn lock_compatible_with(&self, daemon_id: &DaemonId) -> bool {
        self.lock
            .as_ref()
            .is_none_or(|lock| lock.daemon_id() == daemon_id)
    }

    /// Returns whether the current stage expects jobs of `job_type`.
    #[must_use]
    pub fn expects(&self, job_type: JobType) -> bool {
        self.stage.accepts(job_type)
    }

    /// Fails with an ownership conflict when another daemon holds the lock.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseDomainError::ProjectLockedByOtherDaemon`] when the lock
    /// is held by a daemon other than `caller`.
    pub fn ensure_not_locked_by_other(&self, caller: &DaemonId) -> Result<(), LeaseDomainError> {
        match &self.lock {
            Some(lock) if lock.daemon_id() != caller => {
                Err(LeaseDomainError::ProjectLockedByOtherDaemon {
                    project_id: self.id,
                    owner: lock.daemon_id().clone(),
                    caller: caller.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Validates a stage change requested by orchestration.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseDomainError::InvalidStageChange`] when the project is
    /// already in a terminal stage or the target equals the current stage.
    pub fn ensure_can_move_to(&self, target: ProjectStage) -> Result<(), LeaseDomainError> {
        if self.stage.is_terminal() || self.stage == target {
            return Err(LeaseDomainError::InvalidStageChange {
                project_id: self.id,
                from: self.stage,
                to: target,
            });
        }
        Ok(())
    }

    /// Sets the lock holder.
    pub(crate) fn acquire_lock(&mut self, daemon_id: &DaemonId, at: DateTime<Utc>) {
        self.lock = Some(ProjectLock::new(daemon_id.clone(), at));
        self.updated_at = at;
    }

    /// Clears the lock only when `daemon_id` still holds it.
    ///
    /// Returns whether the lock was released.
    pub(crate) fn release_lock_held_by(&mut self, daemon_id: &DaemonId, at: DateTime<Utc>) -> bool {
        if !self.is_locked_by(daemon_id) {
            return false;
        }
        self.lock = None;
        self.updated_at = at;
        true
    }

    /// Clears the lock regardless of holder, returning the previous holder.
    pub(crate) fn clear_lock(&mut self, at: DateTime<Utc>) -> Option<DaemonId> {
        let previous = self.lock.take().map(|lock| lock.daemon_id);
        if previous.is_some() {
            self.updated_at = at;
        }
        previous
    }

    /// Moves the project to `stage`.
    pub(crate) fn set_stage(&mut self, stage: ProjectStage, at: DateTime<Utc>) {
        self.stage = stage;
        self.updated_at = at;
    }
}
