//! Shared fixtures for lease tests.

use std::sync::Arc;

use crate::lease::{
    adapters::memory::InMemoryLeaseStore,
    domain::{DaemonId, Job, JobType, Project, ProjectId, ProjectStage},
    ports::LeaseStore,
    services::{JobLeaseService, StaleLeaseSweeper},
};
use crate::test_support::ManualClock;
use rstest::fixture;
use serde_json::json;

pub(super) type TestService = JobLeaseService<InMemoryLeaseStore, ManualClock>;

/// Lease service, sweeper, and the store and clock they share.
pub(super) struct Harness {
    pub store: Arc<InMemoryLeaseStore>,
    pub clock: ManualClock,
    pub service: TestService,
    pub sweeper: StaleLeaseSweeper<InMemoryLeaseStore, ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryLeaseStore::new());
        let clock = ManualClock::fixed();
        let service = JobLeaseService::new(Arc::clone(&store), Arc::new(clock.clone()));
        let sweeper = StaleLeaseSweeper::new(Arc::clone(&store), Arc::new(clock.clone()));
        Self {
            store,
            clock,
            service,
            sweeper,
        }
    }

    /// Creates a project and moves it to `stage`.
    pub async fn project_in(&self, stage: ProjectStage) -> Project {
        let project = self
            .service
            .create_project()
            .await
            .expect("project creation should succeed");
        if stage == ProjectStage::Draft {
            return project;
        }
        self.service
            .advance_stage(project.id(), stage)
            .await
            .expect("stage change should succeed")
    }

    /// Queues a job through the service.
    pub async fn enqueue(&self, project_id: ProjectId, job_type: JobType) -> Job {
        self.service
            .enqueue_job(project_id, job_type, json!({"prompt": "harbour at dusk"}), None)
            .await
            .expect("enqueue should succeed")
    }

    /// Stores an extra queued job directly, bypassing the duplicate check.
    pub async fn insert_queued(&self, project_id: ProjectId, job_type: JobType) -> Job {
        let job = Job::new(project_id, job_type, json!({}), &self.clock);
        self.store
            .store_job(&job)
            .await
            .expect("job insert should succeed");
        job
    }
}

#[fixture]
pub(super) fn harness() -> Harness {
    Harness::new()
}

pub(super) fn daemon(name: &str) -> DaemonId {
    DaemonId::new(name).expect("valid daemon id")
}
