//! Then steps for lease hand-off BDD scenarios.

use super::world::{LeaseWorld, run_async};
use eyre::WrapErr;
use reelqueue::lease::domain::{ClaimOutcome, ClaimRejection, JobStatus};
use rstest_bdd_macros::then;

#[then("the claim succeeds")]
fn claim_succeeds(world: &LeaseWorld) -> Result<(), eyre::Report> {
    let outcome = world
        .last_claim
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing claim outcome"))?;
    eyre::ensure!(outcome.claimed(), "expected a successful claim, got {outcome:?}");
    Ok(())
}

#[then(r#"the claim is rejected because the job is "{status}""#)]
fn claim_rejected_not_queued(world: &LeaseWorld, status: String) -> Result<(), eyre::Report> {
    let expected = JobStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid status in scenario: {err}"))?;
    let outcome = world
        .last_claim
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing claim outcome"))?;
    eyre::ensure!(
        *outcome == ClaimOutcome::Rejected(ClaimRejection::JobNotQueued { status: expected }),
        "expected a not-queued rejection, got {outcome:?}"
    );
    Ok(())
}

#[then(r#"the job status is "{status}""#)]
fn job_status_is(world: &LeaseWorld, status: String) -> Result<(), eyre::Report> {
    let expected = JobStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid status in scenario: {err}"))?;
    let job = run_async(world.service.load_job(world.job()?.id())).wrap_err("load job")?;
    eyre::ensure!(
        job.status() == expected,
        "expected status {expected}, found {}",
        job.status()
    );
    Ok(())
}

#[then(r#"the project is locked by "{name}""#)]
fn project_locked_by(world: &LeaseWorld, name: String) -> Result<(), eyre::Report> {
    let project =
        run_async(world.service.load_project(world.project()?.id())).wrap_err("load project")?;
    let holder = project.lock().map(|lock| lock.daemon_id().as_str());
    eyre::ensure!(
        holder == Some(name.as_str()),
        "expected lock held by {name}, found {holder:?}"
    );
    Ok(())
}

#[then("the project is unlocked")]
fn project_unlocked(world: &LeaseWorld) -> Result<(), eyre::Report> {
    let project =
        run_async(world.service.load_project(world.project()?.id())).wrap_err("load project")?;
    eyre::ensure!(
        project.lock().is_none(),
        "expected no lock, found {:?}",
        project.lock()
    );
    Ok(())
}

#[then("the report is refused as an ownership conflict")]
fn report_refused(world: &LeaseWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_report
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing report result"))?;
    eyre::ensure!(
        matches!(result, Err(err) if err.is_ownership_conflict()),
        "expected an ownership conflict, got {result:?}"
    );
    Ok(())
}
