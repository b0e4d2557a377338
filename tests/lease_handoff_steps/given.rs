//! Given steps for lease hand-off BDD scenarios.

use super::world::{LeaseWorld, run_async};
use crate::test_helpers::daemon;
use chrono::TimeDelta;
use eyre::WrapErr;
use reelqueue::lease::domain::{JobStatus, JobType, ProjectStage};
use rstest_bdd_macros::given;
use serde_json::json;

#[given(r#"a project in stage "{stage}" with a queued "{job_type}" job"#)]
fn project_with_queued_job(
    world: &mut LeaseWorld,
    stage: String,
    job_type: String,
) -> Result<(), eyre::Report> {
    let target_stage = ProjectStage::try_from(stage.as_str())
        .map_err(|err| eyre::eyre!("invalid stage in scenario: {err}"))?;
    let queued_type = JobType::try_from(job_type.as_str())
        .map_err(|err| eyre::eyre!("invalid job type in scenario: {err}"))?;
    let created = run_async(world.service.create_project()).wrap_err("create project")?;
    let project = run_async(world.service.advance_stage(created.id(), target_stage))
        .wrap_err("move project to scenario stage")?;
    let job = run_async(
        world
            .service
            .enqueue_job(project.id(), queued_type, json!({}), None),
    )
    .wrap_err("queue scenario job")?;
    world.project = Some(project);
    world.job = Some(job);
    Ok(())
}

#[given(r#"daemon "{name}" has claimed the job"#)]
fn daemon_has_claimed(world: &mut LeaseWorld, name: String) -> Result<(), eyre::Report> {
    let job_id = world.job()?.id();
    let outcome = run_async(world.service.claim(job_id, &daemon(&name)))
        .wrap_err("claim job in scenario setup")?;
    eyre::ensure!(outcome.claimed(), "setup claim was rejected: {outcome:?}");
    Ok(())
}

#[given(r#"daemon "{name}" has reported "{status}""#)]
fn daemon_has_reported(
    world: &mut LeaseWorld,
    name: String,
    status: String,
) -> Result<(), eyre::Report> {
    let reported = JobStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid status in scenario: {err}"))?;
    let job_id = world.job()?.id();
    run_async(world.service.report_status(job_id, &daemon(&name), reported))
        .wrap_err("report status in scenario setup")?;
    Ok(())
}

#[given("{minutes:i64} minutes pass without progress")]
fn minutes_pass(world: &mut LeaseWorld, minutes: i64) {
    world.clock.advance(TimeDelta::minutes(minutes));
}
