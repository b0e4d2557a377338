//! Shared fixtures for publish tests.

use std::sync::Arc;

use crate::lease::domain::{DaemonId, ProjectId};
use crate::publish::{
    adapters::memory::InMemoryPublishStore,
    domain::{
        Cadence, ChannelCredentials, ChannelProvider, LanguageCode, NewChannel, ProviderTaskId,
        PublishChannel, PublishTask, PublishTaskStatus, ScheduleRequest, TaskTransition,
        TimeOfDay, UserId,
    },
    services::{PublishScheduler, PublishTaskService},
};
use crate::test_support::ManualClock;
use rstest::fixture;
use serde_json::json;

/// Scheduler, task service, and the store and clock they share.
pub(super) struct PublishHarness {
    pub store: Arc<InMemoryPublishStore>,
    pub clock: ManualClock,
    pub scheduler: PublishScheduler<InMemoryPublishStore, ManualClock>,
    pub tasks: PublishTaskService<InMemoryPublishStore, ManualClock>,
}

impl PublishHarness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryPublishStore::new());
        let clock = ManualClock::fixed();
        let scheduler = PublishScheduler::new(Arc::clone(&store), Arc::new(clock.clone()));
        let tasks = PublishTaskService::new(Arc::clone(&store), Arc::new(clock.clone()));
        Self {
            store,
            clock,
            scheduler,
            tasks,
        }
    }

    /// Registers a YouTube channel for `user_id`.
    pub async fn channel_for(&self, user_id: UserId, external_id: &str) -> PublishChannel {
        self.tasks
            .register_channel(NewChannel {
                user_id,
                provider: ChannelProvider::Youtube,
                external_channel_id: external_id.to_owned(),
                credentials: ChannelCredentials::new(json!({"refresh_token": "rt-1"})),
                metadata: json!({"title": "Harbour Stories"}),
            })
            .await
            .expect("channel registration should succeed")
    }

    /// Books a task through the scheduler.
    pub async fn schedule(&self, request: &ScheduleRequest) -> PublishTask {
        self.scheduler
            .schedule_task(request)
            .await
            .expect("scheduling should succeed")
    }

    /// Drives a freshly scheduled task to `scheduled` with `provider_task`.
    pub async fn publish(&self, task: &PublishTask, provider_task: &str) -> PublishTask {
        self.tasks
            .report_transition(task.id(), TaskTransition::to(PublishTaskStatus::Processing))
            .await
            .expect("processing should succeed");
        self.tasks
            .report_transition(
                task.id(),
                TaskTransition::to(PublishTaskStatus::Scheduled)
                    .with_provider_task_id(provider(provider_task)),
            )
            .await
            .expect("scheduling with provider should succeed")
    }
}

#[fixture]
pub(super) fn harness() -> PublishHarness {
    PublishHarness::new()
}

pub(super) fn request(
    user_id: UserId,
    channel: &PublishChannel,
    base_time: &str,
    cadence_days: u32,
) -> ScheduleRequest {
    ScheduleRequest {
        user_id,
        channel_id: channel.id(),
        project_id: ProjectId::new(),
        language_code: LanguageCode::new("en").expect("valid language code"),
        base_time: base_time.parse::<TimeOfDay>().expect("valid time of day"),
        cadence: Cadence::days(cadence_days).expect("valid cadence"),
    }
}

pub(super) fn provider(id: &str) -> ProviderTaskId {
    ProviderTaskId::new(id).expect("valid provider task id")
}

pub(super) fn worker(name: &str) -> DaemonId {
    DaemonId::new(name).expect("valid worker id")
}
