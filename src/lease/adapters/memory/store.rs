//! In-memory lease store.
//!
//! All state sits behind one `RwLock`; every mutating call holds the write
//! guard for its whole check-and-write, which makes it atomic with respect to
//! every other caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::lease::{
    domain::{
        ClaimOutcome, DaemonId, ForcedRelease, Job, JobId, JobStatus, JobType, Project, ProjectId,
        ProjectStage, ReportPlan, evaluate_claim,
    },
    ports::{
        JobStatusChange, JobStatusChangeOutcome, LeaseStore, LeaseStoreError, LeaseStoreResult,
        StaleLeaseQuery,
    },
};

/// Thread-safe in-memory lease store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLeaseStore {
    state: Arc<RwLock<InMemoryLeaseState>>,
}

#[derive(Debug, Default)]
struct InMemoryLeaseState {
    projects: HashMap<ProjectId, Project>,
    jobs: HashMap<JobId, Job>,
}

impl InMemoryLeaseState {
    fn running_job_of(&self, project_id: ProjectId) -> Option<JobId> {
        self.jobs
            .values()
            .find(|job| job.project_id() == project_id && job.status() == JobStatus::Running)
            .map(Job::id)
    }
}

impl InMemoryLeaseStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored project and job, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseStoreError::Persistence`] when the lock is poisoned.
    pub fn snapshot(&self) -> LeaseStoreResult<(Vec<Project>, Vec<Job>)> {
        let state = self.read()?;
        let mut projects: Vec<Project> = state.projects.values().cloned().collect();
        projects.sort_by_key(|project| project.id().into_inner());
        let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.id().into_inner());
        Ok((projects, jobs))
    }

    fn read(&self) -> LeaseStoreResult<RwLockReadGuard<'_, InMemoryLeaseState>> {
        self.state
            .read()
            .map_err(|err| LeaseStoreError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> LeaseStoreResult<RwLockWriteGuard<'_, InMemoryLeaseState>> {
        self.state
            .write()
            .map_err(|err| LeaseStoreError::persistence(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn store_project(&self, project: &Project) -> LeaseStoreResult<()> {
        let mut state = self.write()?;
        if state.projects.contains_key(&project.id()) {
            return Err(LeaseStoreError::DuplicateProject(project.id()));
        }
        state.projects.insert(project.id(), project.clone());
        Ok(())
    }

    async fn find_project(&self, id: ProjectId) -> LeaseStoreResult<Option<Project>> {
        let state = self.read()?;
        Ok(state.projects.get(&id).cloned())
    }

    async fn change_project_stage(
        &self,
        id: ProjectId,
        expected: ProjectStage,
        target: ProjectStage,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<bool> {
        let mut state = self.write()?;
        let project = state
            .projects
            .get_mut(&id)
            .ok_or(LeaseStoreError::ProjectNotFound(id))?;
        if project.stage() != expected {
            return Ok(false);
        }
        project.set_stage(target, at);
        Ok(true)
    }

    async fn store_job(&self, job: &Job) -> LeaseStoreResult<()> {
        let mut state = self.write()?;
        if state.jobs.contains_key(&job.id()) {
            return Err(LeaseStoreError::DuplicateJob(job.id()));
        }
        if !state.projects.contains_key(&job.project_id()) {
            return Err(LeaseStoreError::ProjectNotFound(job.project_id()));
        }
        state.jobs.insert(job.id(), job.clone());
        Ok(())
    }

    async fn find_job(&self, id: JobId) -> LeaseStoreResult<Option<Job>> {
        let state = self.read()?;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn try_claim(
        &self,
        job_id: JobId,
        daemon_id: &DaemonId,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<ClaimOutcome> {
        let mut state = self.write()?;
        let job = state
            .jobs
            .get(&job_id)
            .ok_or(LeaseStoreError::JobNotFound(job_id))?;
        let project_id = job.project_id();
        let project = state
            .projects
            .get(&project_id)
            .ok_or(LeaseStoreError::ProjectNotFound(project_id))?;
        let has_running_job = state.running_job_of(project_id).is_some();

        if let Err(rejection) = evaluate_claim(project, job, daemon_id, has_running_job) {
            return Ok(ClaimOutcome::Rejected(rejection));
        }

        if let Some(project_mut) = state.projects.get_mut(&project_id) {
            project_mut.acquire_lock(daemon_id, at);
        }
        let job_mut = state
            .jobs
            .get_mut(&job_id)
            .ok_or(LeaseStoreError::JobNotFound(job_id))?;
        job_mut.mark_claimed(daemon_id, at);
        Ok(ClaimOutcome::Claimed(job_mut.clone()))
    }

    async fn apply_status_change(
        &self,
        change: &JobStatusChange,
    ) -> LeaseStoreResult<JobStatusChangeOutcome> {
        let mut state = self.write()?;
        let job = state
            .jobs
            .get_mut(&change.job_id)
            .ok_or(LeaseStoreError::JobNotFound(change.job_id))?;

        let owned = job.daemon_id().is_none_or(|owner| *owner == change.daemon_id);
        let applied = owned
            && match change.plan {
                ReportPlan::Heartbeat => job.status() == JobStatus::Running,
                ReportPlan::Transition { from, .. } => job.status() == from,
                ReportPlan::Unchanged(status) => job.status() == status,
            };
        if !applied {
            return Ok(JobStatusChangeOutcome {
                applied: false,
                lock_released: false,
            });
        }
        job.apply_report(change.plan, change.at);

        let project_running = state.jobs.values().any(|other| {
            other.project_id() == change.project_id && other.status() == JobStatus::Running
        });
        let lock_released = change.plan.releases_lock()
            && !project_running
            && state
                .projects
                .get_mut(&change.project_id)
                .is_some_and(|project| project.release_lock_held_by(&change.daemon_id, change.at));

        Ok(JobStatusChangeOutcome {
            applied: true,
            lock_released,
        })
    }

    async fn list_claimable(
        &self,
        daemon_id: &DaemonId,
        limit: usize,
    ) -> LeaseStoreResult<Vec<Job>> {
        let state = self.read()?;
        let mut claimable: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.is_claimable_by(daemon_id))
            .filter(|job| {
                state.projects.get(&job.project_id()).is_some_and(|project| {
                    project.expects(job.job_type()) && project.lock_compatible_with(daemon_id)
                })
            })
            .cloned()
            .collect();
        claimable.sort_by_key(|job| (job.created_at(), job.id().into_inner()));
        claimable.truncate(limit);
        Ok(claimable)
    }

    async fn has_active_job(
        &self,
        project_id: ProjectId,
        job_type: JobType,
    ) -> LeaseStoreResult<bool> {
        let state = self.read()?;
        Ok(state.jobs.values().any(|job| {
            job.project_id() == project_id && job.job_type() == job_type && job.status().is_active()
        }))
    }

    async fn find_stale(&self, query: &StaleLeaseQuery) -> LeaseStoreResult<Vec<Job>> {
        let state = self.read()?;
        let mut stale: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.updated_at() < query.cutoff)
            .filter(|job| query.statuses.contains(&job.status()))
            .filter(|job| {
                query
                    .project_id
                    .is_none_or(|project_id| job.project_id() == project_id)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|job| (job.updated_at(), job.created_at(), job.id().into_inner()));
        stale.truncate(query.limit);
        Ok(stale)
    }

    async fn fail_stale(
        &self,
        job: &Job,
        reason: &str,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<bool> {
        let mut state = self.write()?;
        let Some(stored) = state.jobs.get_mut(&job.id()) else {
            return Ok(false);
        };
        if stored.status() != job.status() || stored.updated_at() != job.updated_at() {
            return Ok(false);
        }
        stored.mark_stale(reason, at);
        Ok(true)
    }

    async fn requeue_paused(
        &self,
        job_id: JobId,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<Option<Job>> {
        let mut state = self.write()?;
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(LeaseStoreError::JobNotFound(job_id))?;
        if job.status() != JobStatus::Paused {
            return Ok(None);
        }
        job.requeue(at);
        Ok(Some(job.clone()))
    }

    async fn force_release_lock(
        &self,
        project_id: ProjectId,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<ForcedRelease> {
        let mut state = self.write()?;
        let running = state.running_job_of(project_id);
        let project = state
            .projects
            .get_mut(&project_id)
            .ok_or(LeaseStoreError::ProjectNotFound(project_id))?;
        if project.lock().is_none() {
            return Ok(ForcedRelease::NotLocked);
        }
        if let Some(job_id) = running {
            return Ok(ForcedRelease::JobStillRunning(job_id));
        }
        Ok(project
            .clear_lock(at)
            .map_or(ForcedRelease::NotLocked, ForcedRelease::Released))
    }
}
