//! Then steps for publish booking BDD scenarios.

use super::world::{PublishWorld, run_async};
use chrono::{DateTime, Utc};
use eyre::WrapErr;
use reelqueue::publish::domain::PublishTaskStatus;
use rstest_bdd_macros::then;

fn instant(raw: &str) -> Result<DateTime<Utc>, eyre::Report> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

#[then(r#"the booked slots are "{first}" and "{second}""#)]
fn booked_slots_are(world: &PublishWorld, first: String, second: String) -> Result<(), eyre::Report> {
    let expected = vec![instant(&first)?, instant(&second)?];
    let actual: Vec<_> = world.booked.iter().map(|task| task.publish_at()).collect();
    eyre::ensure!(actual == expected, "expected slots {expected:?}, found {actual:?}");
    Ok(())
}

#[then(r#"the last booking is at "{at}""#)]
fn last_booking_is_at(world: &PublishWorld, at: String) -> Result<(), eyre::Report> {
    let expected = instant(&at)?;
    let actual = world.last_booked()?.publish_at();
    eyre::ensure!(actual == expected, "expected slot {expected}, found {actual}");
    Ok(())
}

#[then("the transition is accepted")]
fn transition_accepted(world: &PublishWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_transition
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing transition result"))?;
    eyre::ensure!(result.is_ok(), "expected an accepted transition, got {result:?}");
    Ok(())
}

#[then("the transition is refused")]
fn transition_refused(world: &PublishWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_transition
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing transition result"))?;
    eyre::ensure!(result.is_err(), "expected a refused transition, got {result:?}");
    Ok(())
}

#[then(r#"the booked task is "{status}" with provider task "{provider_task}""#)]
fn booked_task_state(
    world: &PublishWorld,
    status: String,
    provider_task: String,
) -> Result<(), eyre::Report> {
    let expected = PublishTaskStatus::try_from(status.as_str())?;
    let task = run_async(world.tasks.load_task(world.last_booked()?.id()))
        .wrap_err("load booked task")?;
    eyre::ensure!(
        task.status() == expected,
        "expected status {expected}, found {}",
        task.status()
    );
    let recorded = task.provider_task_id().map(|id| id.as_str());
    eyre::ensure!(
        recorded == Some(provider_task.as_str()),
        "expected provider task {provider_task}, found {recorded:?}"
    );
    Ok(())
}
