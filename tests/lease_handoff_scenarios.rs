//! Behaviour tests for project lease hand-off between daemons.

mod test_helpers;

#[path = "lease_handoff_steps/mod.rs"]
mod lease_handoff_steps_defs;

use lease_handoff_steps_defs::world::{LeaseWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/lease_handoff.feature",
    name = "A daemon claims a queued job"
)]
#[tokio::test(flavor = "multi_thread")]
async fn daemon_claims_queued_job(world: LeaseWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lease_handoff.feature",
    name = "A leased job cannot be claimed by another daemon"
)]
#[tokio::test(flavor = "multi_thread")]
async fn leased_job_rejects_second_daemon(world: LeaseWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lease_handoff.feature",
    name = "Finishing a job releases the project lock"
)]
#[tokio::test(flavor = "multi_thread")]
async fn finishing_releases_lock(world: LeaseWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lease_handoff.feature",
    name = "Another daemon's report is refused"
)]
#[tokio::test(flavor = "multi_thread")]
async fn foreign_report_refused(world: LeaseWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lease_handoff.feature",
    name = "A paused job is requeued and picked up elsewhere"
)]
#[tokio::test(flavor = "multi_thread")]
async fn paused_job_changes_hands(world: LeaseWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lease_handoff.feature",
    name = "A stalled lease is failed by the sweeper"
)]
#[tokio::test(flavor = "multi_thread")]
async fn stalled_lease_swept(world: LeaseWorld) {
    let _ = world;
}
