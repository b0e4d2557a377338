//! Behaviour tests for publish slot booking and task reports.

mod test_helpers;

#[path = "publish_schedule_steps/mod.rs"]
mod publish_schedule_steps_defs;

use publish_schedule_steps_defs::world::{PublishWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/publish_schedule.feature",
    name = "Weekly bookings land a cadence apart"
)]
#[tokio::test(flavor = "multi_thread")]
async fn weekly_bookings_cadence_apart(world: PublishWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/publish_schedule.feature",
    name = "A base time already passed today rolls forward by the cadence"
)]
#[tokio::test(flavor = "multi_thread")]
async fn passed_base_time_rolls_forward(world: PublishWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/publish_schedule.feature",
    name = "A failed attempt frees its slot"
)]
#[tokio::test(flavor = "multi_thread")]
async fn failed_attempt_frees_slot(world: PublishWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/publish_schedule.feature",
    name = "A duplicate scheduled report changes nothing"
)]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_scheduled_report_is_noop(world: PublishWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/publish_schedule.feature",
    name = "A second provider task for one booking is refused"
)]
#[tokio::test(flavor = "multi_thread")]
async fn second_provider_task_refused(world: PublishWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/publish_schedule.feature",
    name = "Cleanup needs a provider task"
)]
#[tokio::test(flavor = "multi_thread")]
async fn cleanup_needs_provider_task(world: PublishWorld) {
    let _ = world;
}
