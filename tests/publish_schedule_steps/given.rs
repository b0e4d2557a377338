//! Given steps for publish booking BDD scenarios.

use super::world::{PublishWorld, run_async};
use chrono::TimeDelta;
use eyre::WrapErr;
use reelqueue::publish::domain::{
    ChannelCredentials, ChannelProvider, NewChannel, ProviderTaskId, PublishTaskStatus,
    TaskTransition,
};
use rstest_bdd_macros::given;
use serde_json::json;

#[given(r#"a user with a channel "{handle}""#)]
fn user_with_channel(world: &mut PublishWorld, handle: String) -> Result<(), eyre::Report> {
    let channel = run_async(world.tasks.register_channel(NewChannel {
        user_id: world.user_id,
        provider: ChannelProvider::Youtube,
        external_channel_id: handle,
        credentials: ChannelCredentials::new(json!({"refresh_token": "rt-1"})),
        metadata: json!({}),
    }))
    .wrap_err("register scenario channel")?;
    world.channel = Some(channel);
    Ok(())
}

#[given("the clock moves forward {hours:i64} hours")]
fn clock_moves_forward(world: &mut PublishWorld, hours: i64) {
    world.clock.advance(TimeDelta::hours(hours));
}

#[given(r#"a "{language}" video is booked at "{base_time}" every {days:u32} days"#)]
fn video_was_booked(
    world: &mut PublishWorld,
    language: String,
    base_time: String,
    days: u32,
) -> Result<(), eyre::Report> {
    super::when::book(world, &language, &base_time, days)
}

#[given("the booked task failed during processing")]
fn booked_task_failed(world: &mut PublishWorld) -> Result<(), eyre::Report> {
    let task_id = world.last_booked()?.id();
    run_async(
        world
            .tasks
            .report_transition(task_id, TaskTransition::to(PublishTaskStatus::Processing)),
    )
    .wrap_err("start processing")?;
    run_async(world.tasks.report_transition(
        task_id,
        TaskTransition::to(PublishTaskStatus::Failed).with_error_message("upload rejected"),
    ))
    .wrap_err("fail processing")?;
    Ok(())
}

#[given(r#"the booked task was accepted by the provider as "{provider_task}""#)]
fn booked_task_accepted(world: &mut PublishWorld, provider_task: String) -> Result<(), eyre::Report> {
    let task_id = world.last_booked()?.id();
    run_async(
        world
            .tasks
            .report_transition(task_id, TaskTransition::to(PublishTaskStatus::Processing)),
    )
    .wrap_err("start processing")?;
    run_async(world.tasks.report_transition(
        task_id,
        TaskTransition::to(PublishTaskStatus::Scheduled)
            .with_provider_task_id(ProviderTaskId::new(provider_task)?),
    ))
    .wrap_err("accept at provider")?;
    Ok(())
}
