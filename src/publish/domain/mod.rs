//! Domain model for scheduled publishing.
//!
//! Channels hold provider credentials; publish tasks move through the
//! publish and cleanup lifecycle. Slot arithmetic is pure so the scheduler
//! and its tests share it.

mod channel;
mod error;
mod ids;
mod schedule;
mod status;
mod task;

pub use channel::{
    ChannelCredentials, ChannelProvider, NewChannel, PersistedChannelData, PublishChannel,
};
pub use error::{ParseChannelProviderError, ParsePublishTaskStatusError, PublishDomainError};
pub use ids::{ChannelId, LanguageCode, ProviderTaskId, PublishTaskId, UserId};
pub use schedule::{Cadence, SchedulePolicy, ScheduleRequest, TimeOfDay, first_candidate};
pub use status::PublishTaskStatus;
pub use task::{
    NewPublishTask, PersistedPublishTaskData, PublishTask, TaskTransition, TaskUpdate,
    TransitionPlan,
};
