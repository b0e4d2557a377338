//! Store port for publish channels and tasks.
//!
//! Task writes are conditional on the task's current status; slot
//! uniqueness for blocking tasks is enforced by the store itself.

use crate::lease::domain::DaemonId;
use crate::publish::domain::{
    ChannelCredentials, ChannelId, LanguageCode, PublishChannel, PublishTask, PublishTaskId,
    PublishTaskStatus, TaskUpdate, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for publish store operations.
pub type PublishStoreResult<T> = Result<T, PublishStoreError>;

/// Conditional status write for a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusWrite {
    /// Task to update.
    pub task_id: PublishTaskId,
    /// Statuses the task must currently be in.
    pub expected: Vec<PublishTaskStatus>,
    /// Changes to apply.
    pub update: TaskUpdate,
    /// Time of the write.
    pub at: DateTime<Utc>,
}

/// Batch move of the oldest eligible tasks into a worker's hands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAcquisition {
    /// Statuses eligible for acquisition.
    pub from: Vec<PublishTaskStatus>,
    /// Status acquired tasks move to.
    pub to: PublishTaskStatus,
    /// Acquiring worker.
    pub claimed_by: DaemonId,
    /// Maximum number of tasks to acquire.
    pub limit: usize,
    /// Time of the acquisition.
    pub at: DateTime<Utc>,
}

/// Publish persistence contract.
#[async_trait]
pub trait PublishStore: Send + Sync {
    /// Stores a new channel.
    ///
    /// # Errors
    ///
    /// Returns [`PublishStoreError::DuplicateChannel`] when the identifier or
    /// the provider's channel identifier is already registered.
    async fn store_channel(&self, channel: &PublishChannel) -> PublishStoreResult<()>;

    /// Finds a channel by identifier.
    async fn find_channel(&self, id: ChannelId) -> PublishStoreResult<Option<PublishChannel>>;

    /// Replaces a channel's credential material and returns the channel.
    ///
    /// # Errors
    ///
    /// Returns [`PublishStoreError::ChannelNotFound`] when the channel does
    /// not exist.
    async fn update_channel_credentials(
        &self,
        id: ChannelId,
        credentials: &ChannelCredentials,
        at: DateTime<Utc>,
    ) -> PublishStoreResult<PublishChannel>;

    /// Inserts a new task.
    ///
    /// # Errors
    ///
    /// Returns [`PublishStoreError::SlotTaken`] when a blocking task on the
    /// same channel already holds `publish_at`,
    /// [`PublishStoreError::DuplicateTask`] when the identifier exists, and
    /// [`PublishStoreError::ChannelNotFound`] for an unknown channel.
    async fn insert_task(&self, task: &PublishTask) -> PublishStoreResult<()>;

    /// Finds a task by identifier.
    async fn find_task(&self, id: PublishTaskId) -> PublishStoreResult<Option<PublishTask>>;

    /// Returns the task with the latest `publish_at` for a user, channel and
    /// language among `statuses`.
    async fn latest_task_for(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        language_code: &LanguageCode,
        statuses: &[PublishTaskStatus],
    ) -> PublishStoreResult<Option<PublishTask>>;

    /// Returns a blocking task on `channel_id` with `publish_at` in the
    /// inclusive range `[start, end]`.
    async fn blocking_task_in_window(
        &self,
        channel_id: ChannelId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PublishStoreResult<Option<PublishTask>>;

    /// Applies `write` when the task is still in one of its expected
    /// statuses.
    ///
    /// Returns the updated task, or `None` when the precondition failed.
    ///
    /// # Errors
    ///
    /// Returns [`PublishStoreError::TaskNotFound`] when the task does not
    /// exist.
    async fn transition_task(
        &self,
        write: &TaskStatusWrite,
    ) -> PublishStoreResult<Option<PublishTask>>;

    /// Lists tasks in `statuses`, oldest first by creation time.
    async fn list_tasks(
        &self,
        statuses: &[PublishTaskStatus],
        limit: usize,
    ) -> PublishStoreResult<Vec<PublishTask>>;

    /// Moves the oldest eligible tasks to the acquired status.
    ///
    /// Tasks taken by a concurrent acquisition are skipped; the result is
    /// oldest first.
    async fn acquire_tasks(
        &self,
        acquisition: &TaskAcquisition,
    ) -> PublishStoreResult<Vec<PublishTask>>;
}

/// Errors returned by publish store implementations.
#[derive(Debug, Clone, Error)]
pub enum PublishStoreError {
    /// A channel with the same identifier or provider channel already exists.
    #[error("duplicate channel: {0}")]
    DuplicateChannel(ChannelId),

    /// A task with the same identifier already exists.
    #[error("duplicate publish task identifier: {0}")]
    DuplicateTask(PublishTaskId),

    /// The channel was not found.
    #[error("channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// The task was not found.
    #[error("publish task not found: {0}")]
    TaskNotFound(PublishTaskId),

    /// A blocking task already occupies the slot.
    #[error("channel {channel_id} already has a task publishing at {publish_at}")]
    SlotTaken {
        /// Channel identifier.
        channel_id: ChannelId,
        /// Occupied slot.
        publish_at: DateTime<Utc>,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl PublishStoreError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
