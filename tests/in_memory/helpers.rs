//! Shared test helpers for in-memory integration tests.

use crate::test_helpers::ManualClock;
use reelqueue::lease::{
    adapters::memory::InMemoryLeaseStore,
    domain::{Project, ProjectId, ProjectStage},
    services::{JobLeaseService, StaleLeaseSweeper},
};
use reelqueue::publish::{
    adapters::memory::InMemoryPublishStore,
    domain::{
        Cadence, ChannelCredentials, ChannelProvider, LanguageCode, NewChannel, PublishChannel,
        ScheduleRequest, TimeOfDay, UserId,
    },
    services::{PublishScheduler, PublishTaskService},
};
use rstest::fixture;
use serde_json::json;
use std::sync::Arc;

/// Lease service over an in-memory store.
pub type LeaseService = JobLeaseService<InMemoryLeaseStore, ManualClock>;

/// Lease service, sweeper, and the store and clock behind them.
pub struct LeaseFixture {
    pub store: Arc<InMemoryLeaseStore>,
    pub clock: ManualClock,
    pub service: LeaseService,
    pub sweeper: StaleLeaseSweeper<InMemoryLeaseStore, ManualClock>,
}

impl LeaseFixture {
    /// Creates a project and moves it straight to `stage`.
    pub async fn project_in(&self, stage: ProjectStage) -> Project {
        let project = self
            .service
            .create_project()
            .await
            .expect("project creation should succeed");
        self.service
            .advance_stage(project.id(), stage)
            .await
            .expect("stage change should succeed")
    }

    /// Returns the current state of `project_id`.
    pub async fn reload(&self, project_id: ProjectId) -> Project {
        self.service
            .load_project(project_id)
            .await
            .expect("project should load")
    }
}

/// Provides fresh lease collaborators for each test.
#[fixture]
pub fn lease() -> LeaseFixture {
    let store = Arc::new(InMemoryLeaseStore::new());
    let clock = ManualClock::fixed();
    LeaseFixture {
        service: JobLeaseService::new(Arc::clone(&store), Arc::new(clock.clone())),
        sweeper: StaleLeaseSweeper::new(Arc::clone(&store), Arc::new(clock.clone())),
        store,
        clock,
    }
}

/// Scheduler and task service over one in-memory store.
pub struct PublishFixture {
    pub store: Arc<InMemoryPublishStore>,
    pub clock: ManualClock,
    pub scheduler: PublishScheduler<InMemoryPublishStore, ManualClock>,
    pub tasks: PublishTaskService<InMemoryPublishStore, ManualClock>,
}

impl PublishFixture {
    /// Registers a `TikTok` channel for `user_id`.
    pub async fn channel(&self, user_id: UserId, handle: &str) -> PublishChannel {
        self.tasks
            .register_channel(NewChannel {
                user_id,
                provider: ChannelProvider::Tiktok,
                external_channel_id: handle.to_owned(),
                credentials: ChannelCredentials::new(json!({"access_token": "at-1"})),
                metadata: json!({}),
            })
            .await
            .expect("channel registration should succeed")
    }
}

/// Provides fresh publish collaborators for each test.
#[fixture]
pub fn publish() -> PublishFixture {
    let store = Arc::new(InMemoryPublishStore::new());
    let clock = ManualClock::fixed();
    PublishFixture {
        scheduler: PublishScheduler::new(Arc::clone(&store), Arc::new(clock.clone())),
        tasks: PublishTaskService::new(Arc::clone(&store), Arc::new(clock.clone())),
        store,
        clock,
    }
}

/// Builds a booking request for a fresh project.
pub fn booking(
    user_id: UserId,
    channel: &PublishChannel,
    language: &str,
    base_time: &str,
    cadence_days: u32,
) -> ScheduleRequest {
    ScheduleRequest {
        user_id,
        channel_id: channel.id(),
        project_id: ProjectId::new(),
        language_code: LanguageCode::new(language).expect("valid language code"),
        base_time: base_time.parse::<TimeOfDay>().expect("valid time of day"),
        cadence: Cadence::days(cadence_days).expect("valid cadence"),
    }
}
