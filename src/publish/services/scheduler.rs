//! Publish scheduler: finds and books conflict-free publication slots.

use crate::publish::{
    domain::{
        ChannelId, NewPublishTask, PublishDomainError, PublishTask, PublishTaskStatus,
        SchedulePolicy, ScheduleRequest, UserId, first_candidate,
    },
    ports::{PublishStore, PublishStoreError},
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Service-level errors for slot scheduling.
#[derive(Debug, Error)]
pub enum PublishSchedulerError {
    /// Request or policy validation failed.
    #[error(transparent)]
    Domain(#[from] PublishDomainError),
    /// Store operation failed.
    #[error(transparent)]
    Store(PublishStoreError),
    /// The channel does not exist.
    #[error("channel not found: {0}")]
    ChannelNotFound(ChannelId),
    /// The channel belongs to another user.
    #[error("channel {channel_id} is not owned by user {user_id}")]
    ChannelNotOwned {
        /// Channel identifier.
        channel_id: ChannelId,
        /// Requesting user.
        user_id: UserId,
    },
    /// Every probed candidate was occupied.
    #[error("no free publication slot on channel {channel_id} within {probes} candidates")]
    NoFreeSlot {
        /// Channel identifier.
        channel_id: ChannelId,
        /// Candidates examined.
        probes: u32,
    },
    /// Concurrent inserts kept taking the computed slot.
    #[error("publication slot on channel {channel_id} contended after {attempts} attempts")]
    SlotContention {
        /// Channel identifier.
        channel_id: ChannelId,
        /// Insert attempts made.
        attempts: u32,
    },
}

impl From<PublishStoreError> for PublishSchedulerError {
    fn from(err: PublishStoreError) -> Self {
        match err {
            PublishStoreError::ChannelNotFound(id) => Self::ChannelNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Result type for scheduler operations.
pub type PublishSchedulerResult<T> = Result<T, PublishSchedulerError>;

/// Computes publication slots and books them as pending tasks.
#[derive(Clone)]
pub struct PublishScheduler<S, C>
where
    S: PublishStore,
    C: Clock + Send + Sync,
{
    store: Arc<S>,
    clock: Arc<C>,
    policy: SchedulePolicy,
}

impl<S, C> PublishScheduler<S, C>
where
    S: PublishStore,
    C: Clock + Send + Sync,
{
    /// Creates a scheduler with the default policy.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self {
            store,
            clock,
            policy: SchedulePolicy::default(),
        }
    }

    /// Replaces the scheduling policy.
    ///
    /// # Errors
    ///
    /// Returns [`PublishSchedulerError::Domain`] when the policy is invalid.
    pub fn with_policy(mut self, policy: SchedulePolicy) -> PublishSchedulerResult<Self> {
        policy.validate()?;
        self.policy = policy;
        Ok(self)
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// Returns the next free slot for the request's series.
    ///
    /// The series continues one cadence after its latest publication, or
    /// starts today at the base time. Candidates at or before now, or within
    /// the conflict window of a blocking task on the channel, are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PublishSchedulerError::NoFreeSlot`] when the probe bound is
    /// exhausted, or a store error.
    pub async fn compute_next_publish_at(
        &self,
        request: &ScheduleRequest,
    ) -> PublishSchedulerResult<DateTime<Utc>> {
        let channel_id = request.channel_id;
        let no_free_slot = PublishSchedulerError::NoFreeSlot {
            channel_id,
            probes: self.policy.max_probe,
        };
        let latest = self
            .store
            .latest_task_for(
                request.user_id,
                channel_id,
                &request.language_code,
                &PublishTaskStatus::HISTORY,
            )
            .await?;
        let Some(mut candidate) = first_candidate(
            latest.as_ref().map(PublishTask::publish_at),
            request.base_time,
            request.cadence,
            self.clock.utc(),
        ) else {
            return Err(no_free_slot);
        };

        let window = self.policy.conflict_window;
        for _ in 0..self.policy.max_probe {
            let (Some(start), Some(end)) = (
                candidate.checked_sub_signed(window),
                candidate.checked_add_signed(window),
            ) else {
                return Err(no_free_slot);
            };
            let Some(occupant) = self
                .store
                .blocking_task_in_window(channel_id, start, end)
                .await?
            else {
                return Ok(candidate);
            };
            debug!(
                channel_id = %channel_id,
                candidate = %candidate,
                task_id = %occupant.id(),
                "publication slot occupied"
            );
            let Some(next) = candidate.checked_add_signed(request.cadence.as_delta()) else {
                return Err(no_free_slot);
            };
            candidate = next;
        }
        Err(no_free_slot)
    }

    /// Books the next free slot as a pending task.
    ///
    /// A slot taken by a concurrent insert triggers a recomputation, up to
    /// the policy's attempt bound.
    ///
    /// # Errors
    ///
    /// Returns [`PublishSchedulerError::ChannelNotFound`],
    /// [`PublishSchedulerError::ChannelNotOwned`],
    /// [`PublishSchedulerError::NoFreeSlot`], or
    /// [`PublishSchedulerError::SlotContention`].
    pub async fn schedule_task(
        &self,
        request: &ScheduleRequest,
    ) -> PublishSchedulerResult<PublishTask> {
        let channel_id = request.channel_id;
        let channel = self
            .store
            .find_channel(channel_id)
            .await?
            .ok_or(PublishSchedulerError::ChannelNotFound(channel_id))?;
        if channel.user_id() != request.user_id {
            return Err(PublishSchedulerError::ChannelNotOwned {
                channel_id,
                user_id: request.user_id,
            });
        }

        for attempt in 1..=self.policy.max_insert_attempts {
            let publish_at = self.compute_next_publish_at(request).await?;
            let task = PublishTask::new(
                NewPublishTask {
                    user_id: request.user_id,
                    channel_id,
                    project_id: request.project_id,
                    language_code: request.language_code.clone(),
                    publish_at,
                },
                &*self.clock,
            );
            match self.store.insert_task(&task).await {
                Ok(()) => {
                    info!(
                        task_id = %task.id(),
                        channel_id = %channel_id,
                        project_id = %request.project_id,
                        publish_at = %publish_at,
                        "publish task scheduled"
                    );
                    return Ok(task);
                }
                Err(PublishStoreError::SlotTaken { .. }) => {
                    debug!(
                        channel_id = %channel_id,
                        publish_at = %publish_at,
                        attempt,
                        "publication slot taken concurrently; recomputing"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(PublishSchedulerError::SlotContention {
            channel_id,
            attempts: self.policy.max_insert_attempts,
        })
    }
}
