//! In-memory integration tests for slot booking and publish hand-off.

use crate::in_memory::helpers::{PublishFixture, booking, publish};
use crate::test_helpers::daemon;
use chrono::{TimeDelta, TimeZone, Utc};
use reelqueue::publish::{
    domain::{ProviderTaskId, PublishTaskStatus, TaskTransition, UserId},
    services::ClaimMode,
};
use rstest::rstest;
use serde_json::json;
use std::sync::Arc;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn languages_on_one_channel_take_consecutive_slots(publish: PublishFixture) {
    let owner = UserId::new();
    let channel = publish.channel(owner, "@harbour").await;

    let mut slots = Vec::new();
    for language in ["en", "es", "fr"] {
        let task = publish
            .scheduler
            .schedule_task(&booking(owner, &channel, language, "09:00", 7))
            .await
            .expect("booking should succeed");
        slots.push(task.publish_at());
    }

    let first = Utc
        .with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid instant");
    assert_eq!(
        slots,
        vec![
            first,
            first + TimeDelta::days(7),
            first + TimeDelta::days(14)
        ]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bookings_on_separate_channels_do_not_interfere(publish: PublishFixture) {
    let owner = UserId::new();
    let scheduler = Arc::new(publish.scheduler.clone());
    let mut handles = Vec::new();
    for index in 0..4 {
        let channel = publish.channel(owner, &format!("@channel-{index}")).await;
        let racer = Arc::clone(&scheduler);
        handles.push(tokio::spawn(async move {
            racer
                .schedule_task(&booking(owner, &channel, "en", "18:30", 1))
                .await
        }));
    }

    for handle in handles {
        let task = handle
            .await
            .expect("booking task should finish")
            .expect("booking should succeed");
        assert_eq!(
            task.publish_at(),
            Utc.with_ymd_and_hms(2026, 3, 2, 18, 30, 0)
                .single()
                .expect("valid instant")
        );
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn claimed_task_flows_through_publish_and_cleanup(publish: PublishFixture) {
    let owner = UserId::new();
    let uploader = daemon("uploader-1");
    let channel = publish.channel(owner, "@harbour").await;
    let request = booking(owner, &channel, "en", "09:00", 7);
    let booked = publish
        .scheduler
        .schedule_task(&request)
        .await
        .expect("booking should succeed");

    let claimed = publish
        .tasks
        .claim_pending_tasks(&uploader, 5, ClaimMode::Acquire)
        .await
        .expect("claim should succeed");
    let handed = claimed.first().expect("booked task should be claimed");
    assert_eq!(handed.task.id(), booked.id());
    assert_eq!(handed.task.claimed_by(), Some(&uploader));
    assert_eq!(
        handed.channel.credentials().expose(),
        &json!({"access_token": "at-1"})
    );

    let provider_task = ProviderTaskId::new("tt-9001").expect("valid provider task id");
    publish
        .tasks
        .report_transition(
            booked.id(),
            TaskTransition::to(PublishTaskStatus::Scheduled)
                .with_provider_task_id(provider_task.clone())
                .with_provider_response(json!({"state": "queued"})),
        )
        .await
        .expect("scheduled report should succeed");
    let again = publish
        .tasks
        .claim_pending_tasks(&uploader, 5, ClaimMode::Acquire)
        .await
        .expect("second claim should succeed");
    assert!(again.is_empty());

    publish.clock.advance(TimeDelta::minutes(5));
    publish
        .tasks
        .request_cleanup(booked.id())
        .await
        .expect("cleanup request should succeed");
    let cleanups = publish
        .tasks
        .claim_cleanup_tasks(&uploader, 5, ClaimMode::Acquire)
        .await
        .expect("cleanup claim should succeed");
    assert_eq!(cleanups.len(), 1);
    let finished = publish
        .tasks
        .report_transition(
            booked.id(),
            TaskTransition::to(PublishTaskStatus::CleanupDone),
        )
        .await
        .expect("cleanup report should succeed");
    assert_eq!(finished.status(), PublishTaskStatus::CleanupDone);
    assert_eq!(finished.provider_task_id(), Some(&provider_task));

    let rebooked = publish
        .scheduler
        .schedule_task(&request)
        .await
        .expect("rebooking should succeed");
    assert_eq!(rebooked.publish_at(), booked.publish_at());

    let stored = publish.store.tasks().expect("snapshot should succeed");
    assert_eq!(stored.len(), 2);
}
