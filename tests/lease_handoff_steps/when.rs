//! When steps for lease hand-off BDD scenarios.

use super::world::{LeaseWorld, run_async};
use crate::test_helpers::daemon;
use chrono::TimeDelta;
use eyre::WrapErr;
use reelqueue::lease::domain::{JobStatus, SweepRequest};
use rstest_bdd_macros::when;

#[when(r#"daemon "{name}" claims the job"#)]
fn daemon_claims(world: &mut LeaseWorld, name: String) -> Result<(), eyre::Report> {
    let job_id = world.job()?.id();
    let outcome =
        run_async(world.service.claim(job_id, &daemon(&name))).wrap_err("claim job")?;
    world.last_claim = Some(outcome);
    Ok(())
}

#[when(r#"daemon "{name}" reports "{status}""#)]
fn daemon_reports(world: &mut LeaseWorld, name: String, status: String) -> Result<(), eyre::Report> {
    let reported = JobStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid status in scenario: {err}"))?;
    let job_id = world.job()?.id();
    let result = run_async(world.service.report_status(job_id, &daemon(&name), reported));
    world.last_report = Some(result);
    Ok(())
}

#[when("the job is requeued")]
fn job_is_requeued(world: &mut LeaseWorld) -> Result<(), eyre::Report> {
    let job_id = world.job()?.id();
    let requeued = run_async(world.service.requeue_job(job_id)).wrap_err("requeue job")?;
    world.job = Some(requeued);
    Ok(())
}

#[when("the sweeper runs with a ttl of {minutes:i64} minutes")]
fn sweeper_runs(world: &mut LeaseWorld, minutes: i64) -> Result<(), eyre::Report> {
    let request = SweepRequest::new(TimeDelta::minutes(minutes));
    run_async(world.sweeper.sweep(&request)).wrap_err("sweep stale leases")?;
    Ok(())
}
