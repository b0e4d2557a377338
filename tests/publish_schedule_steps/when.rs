//! When steps for publish booking BDD scenarios.

use super::world::{PublishWorld, run_async};
use eyre::WrapErr;
use reelqueue::publish::domain::{ProviderTaskId, PublishTaskStatus, TaskTransition};
use rstest_bdd_macros::when;

/// Books a video on the scenario channel and records the task.
///
/// # Errors
///
/// Returns an error when the request is invalid or booking fails.
pub fn book(
    world: &mut PublishWorld,
    language: &str,
    base_time: &str,
    days: u32,
) -> Result<(), eyre::Report> {
    let request = world.request(language, base_time, days)?;
    let task = run_async(world.scheduler.schedule_task(&request)).wrap_err("book video")?;
    world.booked.push(task);
    Ok(())
}

#[when(r#"a "{language}" video is booked at "{base_time}" every {days:u32} days"#)]
fn video_is_booked(
    world: &mut PublishWorld,
    language: String,
    base_time: String,
    days: u32,
) -> Result<(), eyre::Report> {
    book(world, &language, &base_time, days)
}

#[when(r#"the provider acceptance "{provider_task}" is reported again"#)]
fn acceptance_reported_again(
    world: &mut PublishWorld,
    provider_task: String,
) -> Result<(), eyre::Report> {
    let task_id = world.last_booked()?.id();
    let transition = TaskTransition::to(PublishTaskStatus::Scheduled)
        .with_provider_task_id(ProviderTaskId::new(provider_task)?);
    let result = run_async(world.tasks.report_transition(task_id, transition));
    world.last_transition = Some(result);
    Ok(())
}

#[when("cleanup is requested for the booked task")]
fn cleanup_requested(world: &mut PublishWorld) -> Result<(), eyre::Report> {
    let task_id = world.last_booked()?.id();
    let result = run_async(world.tasks.request_cleanup(task_id));
    world.last_transition = Some(result);
    Ok(())
}
