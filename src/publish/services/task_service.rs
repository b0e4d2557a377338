//! Publish task service: channel registration, claims, and transitions.

use crate::lease::domain::DaemonId;
use crate::publish::{
    domain::{
        ChannelCredentials, ChannelId, NewChannel, PublishChannel, PublishDomainError,
        PublishTask, PublishTaskId, PublishTaskStatus, TaskTransition, TransitionPlan,
    },
    ports::{PublishStore, PublishStoreError, TaskAcquisition, TaskStatusWrite},
};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Transitions attempted before a concurrent update is surfaced.
const TRANSITION_ATTEMPTS: usize = 2;

/// Service-level errors for publish task operations.
#[derive(Debug, Error)]
pub enum PublishTaskError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] PublishDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(PublishStoreError),
    /// The task does not exist.
    #[error("publish task not found: {0}")]
    TaskNotFound(PublishTaskId),
    /// The channel does not exist.
    #[error("channel not found: {0}")]
    ChannelNotFound(ChannelId),
    /// The task kept changing underneath the transition.
    #[error("publish task {0} changed concurrently; transition not applied")]
    ConcurrentUpdate(PublishTaskId),
}

impl From<PublishStoreError> for PublishTaskError {
    fn from(err: PublishStoreError) -> Self {
        match err {
            PublishStoreError::TaskNotFound(id) => Self::TaskNotFound(id),
            PublishStoreError::ChannelNotFound(id) => Self::ChannelNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Result type for publish task operations.
pub type PublishTaskResult<T> = Result<T, PublishTaskError>;

/// How a claim treats the selected tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimMode {
    /// List eligible tasks without changing them.
    Inspect,
    /// Move eligible tasks into processing under the claiming worker.
    Acquire,
}

/// Task handed to a publishing worker, with the channel it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedPublishTask {
    /// Claimed task.
    pub task: PublishTask,
    /// Destination channel, including credentials.
    pub channel: PublishChannel,
}

/// Publish task orchestration service.
#[derive(Clone)]
pub struct PublishTaskService<S, C>
where
    S: PublishStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> PublishTaskService<S, C>
where
    S: PublishStore,
    C: Clock + Send + Sync,
{
    /// Creates a new publish task service.
    #[must_use]
    pub const fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Registers a publishing channel.
    ///
    /// # Errors
    ///
    /// Returns a domain error for a blank external identifier or
    /// [`PublishStoreError::DuplicateChannel`] wrapped in
    /// [`PublishTaskError::Store`].
    pub async fn register_channel(&self, input: NewChannel) -> PublishTaskResult<PublishChannel> {
        let channel = PublishChannel::new(input, &*self.clock)?;
        self.store.store_channel(&channel).await?;
        info!(
            channel_id = %channel.id(),
            provider = %channel.provider(),
            "publish channel registered"
        );
        Ok(channel)
    }

    /// Replaces a channel's credential material.
    ///
    /// # Errors
    ///
    /// Returns [`PublishTaskError::ChannelNotFound`] for unknown channels.
    pub async fn refresh_credentials(
        &self,
        channel_id: ChannelId,
        credentials: ChannelCredentials,
    ) -> PublishTaskResult<PublishChannel> {
        let channel = self
            .store
            .update_channel_credentials(channel_id, &credentials, self.clock.utc())
            .await?;
        info!(channel_id = %channel_id, "channel credentials refreshed");
        Ok(channel)
    }

    /// Claims tasks waiting to be published, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error when listing or acquiring fails.
    pub async fn claim_pending_tasks(
        &self,
        worker: &DaemonId,
        limit: usize,
        mode: ClaimMode,
    ) -> PublishTaskResult<Vec<ClaimedPublishTask>> {
        self.claim(
            worker,
            limit,
            mode,
            &PublishTaskStatus::PUBLISH_CLAIMABLE,
            PublishTaskStatus::Processing,
        )
        .await
    }

    /// Claims tasks waiting for provider cleanup, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a store error when listing or acquiring fails.
    pub async fn claim_cleanup_tasks(
        &self,
        worker: &DaemonId,
        limit: usize,
        mode: ClaimMode,
    ) -> PublishTaskResult<Vec<ClaimedPublishTask>> {
        self.claim(
            worker,
            limit,
            mode,
            &PublishTaskStatus::CLEANUP_CLAIMABLE,
            PublishTaskStatus::CleanupProcessing,
        )
        .await
    }

    /// Applies a worker-reported transition.
    ///
    /// Repeating `scheduled` with the same provider task, or a terminal status
    /// the task already has, returns the task unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PublishTaskError::TaskNotFound`], a domain error for illegal
    /// transitions and provider task conflicts, or
    /// [`PublishTaskError::ConcurrentUpdate`] when the task keeps changing.
    pub async fn report_transition(
        &self,
        task_id: PublishTaskId,
        transition: TaskTransition,
    ) -> PublishTaskResult<PublishTask> {
        for _ in 0..TRANSITION_ATTEMPTS {
            let task = self.load_task(task_id).await?;
            let plan = task.plan_transition(&transition).inspect_err(|err| {
                warn!(task_id = %task_id, error = %err, "publish transition rejected");
            })?;
            let TransitionPlan::Apply {
                expected_from,
                update,
            } = plan
            else {
                debug!(task_id = %task_id, status = %task.status(), "publish transition already applied");
                return Ok(task);
            };
            let write = TaskStatusWrite {
                task_id,
                expected: vec![expected_from],
                update,
                at: self.clock.utc(),
            };
            if let Some(updated) = self.store.transition_task(&write).await? {
                info!(
                    task_id = %task_id,
                    from = %expected_from,
                    to = %updated.status(),
                    "publish task transitioned"
                );
                return Ok(updated);
            }
        }
        Err(PublishTaskError::ConcurrentUpdate(task_id))
    }

    /// Requests provider-side cleanup of a scheduled or failed task.
    ///
    /// # Errors
    ///
    /// Returns [`PublishDomainError::NothingToCleanUp`] when the provider never
    /// accepted the task, or the errors of [`Self::report_transition`].
    pub async fn request_cleanup(&self, task_id: PublishTaskId) -> PublishTaskResult<PublishTask> {
        self.report_transition(task_id, TaskTransition::to(PublishTaskStatus::CleanupPending))
            .await
    }

    /// Loads a task.
    ///
    /// # Errors
    ///
    /// Returns [`PublishTaskError::TaskNotFound`] when the task does not exist.
    pub async fn load_task(&self, task_id: PublishTaskId) -> PublishTaskResult<PublishTask> {
        self.store
            .find_task(task_id)
            .await?
            .ok_or(PublishTaskError::TaskNotFound(task_id))
    }

    async fn claim(
        &self,
        worker: &DaemonId,
        limit: usize,
        mode: ClaimMode,
        from: &[PublishTaskStatus],
        to: PublishTaskStatus,
    ) -> PublishTaskResult<Vec<ClaimedPublishTask>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let tasks = match mode {
            ClaimMode::Inspect => self.store.list_tasks(from, limit).await?,
            ClaimMode::Acquire => {
                let acquisition = TaskAcquisition {
                    from: from.to_vec(),
                    to,
                    claimed_by: worker.clone(),
                    limit,
                    at: self.clock.utc(),
                };
                self.store.acquire_tasks(&acquisition).await?
            }
        };
        if tasks.is_empty() {
            debug!(worker = %worker, ?mode, "no publish tasks to claim");
            return Ok(Vec::new());
        }

        let mut channels: HashMap<ChannelId, PublishChannel> = HashMap::new();
        let mut claimed = Vec::with_capacity(tasks.len());
        for task in tasks {
            let channel_id = task.channel_id();
            if !channels.contains_key(&channel_id) {
                let loaded = self
                    .store
                    .find_channel(channel_id)
                    .await?
                    .ok_or(PublishTaskError::ChannelNotFound(channel_id))?;
                channels.insert(channel_id, loaded);
            }
            let channel = channels
                .get(&channel_id)
                .cloned()
                .ok_or(PublishTaskError::ChannelNotFound(channel_id))?;
            if mode == ClaimMode::Acquire {
                info!(task_id = %task.id(), worker = %worker, status = %task.status(), "publish task claimed");
            }
            claimed.push(ClaimedPublishTask { task, channel });
        }
        Ok(claimed)
    }
}
