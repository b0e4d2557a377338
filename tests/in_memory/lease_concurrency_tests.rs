//! In-memory integration tests for competing daemons and stale leases.

use crate::in_memory::helpers::{LeaseFixture, lease};
use crate::test_helpers::daemon;
use chrono::TimeDelta;
use reelqueue::lease::domain::{
    ClaimOutcome, ClaimRejection, ClaimedJob, JobStatus, JobType, ProjectStage, SweepRequest,
};
use rstest::rstest;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_daemons_never_share_a_project(lease: LeaseFixture) {
    let mut queued = HashSet::new();
    for _ in 0..10 {
        let project = lease.project_in(ProjectStage::Scripting).await;
        let job = lease
            .service
            .enqueue_job(project.id(), JobType::Script, json!({}), None)
            .await
            .expect("enqueue should succeed");
        queued.insert(job.id());
    }

    let service = Arc::new(lease.service.clone());
    let mut handles = Vec::new();
    for index in 0..5 {
        let racer = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let daemon_id = daemon(&format!("render-{index}"));
            let claimed = racer
                .claim_batch(&daemon_id, 4)
                .await
                .expect("batch claim should succeed");
            (daemon_id, claimed)
        }));
    }

    let mut claimed: Vec<ClaimedJob> = Vec::new();
    for handle in handles {
        let (daemon_id, batch) = handle.await.expect("claim task should finish");
        for job in &batch {
            let project = lease.reload(job.project_id).await;
            assert_eq!(
                project.lock().map(|held| held.daemon_id()),
                Some(&daemon_id),
                "claimer must hold the project lock"
            );
        }
        claimed.extend(batch);
    }
    let leftovers = lease
        .service
        .claim_batch(&daemon("render-late"), 10)
        .await
        .expect("late claim should succeed");
    claimed.extend(leftovers);

    let ids: HashSet<_> = claimed.iter().map(|job| job.id).collect();
    let projects: HashSet<_> = claimed.iter().map(|job| job.project_id).collect();
    assert_eq!(ids.len(), claimed.len(), "no job may be leased twice");
    assert_eq!(projects.len(), claimed.len(), "one lease per project");
    assert_eq!(ids, queued);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stage_pipeline_hands_off_between_daemons(lease: LeaseFixture) {
    let scripter = daemon("scripter");
    let narrator = daemon("narrator");
    let project = lease.project_in(ProjectStage::Scripting).await;
    lease
        .service
        .enqueue_job(project.id(), JobType::Script, json!({"prompt": "tides"}), None)
        .await
        .expect("script job should queue");

    let scripts = lease
        .service
        .claim_batch(&scripter, 1)
        .await
        .expect("script claim should succeed");
    let script = scripts.first().expect("script job should be claimed");
    let receipt = lease
        .service
        .report_status(script.id, &scripter, JobStatus::Done)
        .await
        .expect("done report should succeed");
    assert!(receipt.lock_released);

    lease
        .service
        .advance_stage(project.id(), ProjectStage::Voiceover)
        .await
        .expect("stage change should succeed");
    lease
        .service
        .enqueue_job(project.id(), JobType::Audio, json!({}), Some(&narrator))
        .await
        .expect("audio job should queue");
    let audio = lease
        .service
        .claim_batch(&narrator, 1)
        .await
        .expect("audio claim should succeed");

    assert_eq!(audio.len(), 1);
    let reloaded = lease.reload(project.id()).await;
    assert_eq!(reloaded.lock().map(|held| held.daemon_id()), Some(&narrator));
    assert_eq!(reloaded.stage(), ProjectStage::Voiceover);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stalled_daemon_is_swept_and_its_lock_recovered(lease: LeaseFixture) {
    let stalled = daemon("stalled");
    let rescuer = daemon("rescuer");
    let project = lease.project_in(ProjectStage::Imagery).await;
    let first = lease
        .service
        .enqueue_job(project.id(), JobType::Image, json!({}), None)
        .await
        .expect("image job should queue");
    let outcome = lease
        .service
        .claim(first.id(), &stalled)
        .await
        .expect("claim should succeed");
    assert!(outcome.claimed());

    lease.clock.advance(TimeDelta::minutes(20));
    let report = lease
        .sweeper
        .sweep(&SweepRequest::new(TimeDelta::minutes(15)))
        .await
        .expect("sweep should succeed");
    assert_eq!(report.swept, vec![first.id()]);

    let late = lease
        .service
        .report_status(first.id(), &stalled, JobStatus::Done)
        .await;
    assert!(late.is_err(), "a swept lease cannot be completed");

    let retry = lease
        .service
        .enqueue_job(project.id(), JobType::Image, json!({}), None)
        .await
        .expect("retry job should queue");
    let blocked = lease
        .service
        .claim(retry.id(), &rescuer)
        .await
        .expect("claim attempt should succeed");
    assert_eq!(
        blocked,
        ClaimOutcome::Rejected(ClaimRejection::ProjectLocked {
            owner: stalled.clone()
        })
    );

    let previous = lease
        .service
        .force_release_project_lock(project.id())
        .await
        .expect("force release should succeed");
    assert_eq!(previous, Some(stalled));
    let rescued = lease
        .service
        .claim(retry.id(), &rescuer)
        .await
        .expect("claim should succeed");
    assert!(rescued.claimed());

    let (_, jobs) = lease.store.snapshot().expect("snapshot should succeed");
    let running = jobs
        .iter()
        .filter(|job| job.status() == JobStatus::Running)
        .count();
    assert_eq!(running, 1);
}
