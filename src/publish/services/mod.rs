//! Application services for publish scheduling and task lifecycle.

mod scheduler;
mod task_service;

pub use scheduler::{PublishScheduler, PublishSchedulerError, PublishSchedulerResult};
pub use task_service::{
    ClaimMode, ClaimedPublishTask, PublishTaskError, PublishTaskResult, PublishTaskService,
};
