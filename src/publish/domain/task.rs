//! Publish task aggregate and its transition rules.

use super::{
    ChannelId, LanguageCode, ProviderTaskId, PublishDomainError, PublishTaskId, PublishTaskStatus,
    UserId,
};
use crate::lease::domain::{DaemonId, ProjectId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields required to create a publish task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPublishTask {
    /// Owning user.
    pub user_id: UserId,
    /// Destination channel.
    pub channel_id: ChannelId,
    /// Project whose video is published.
    pub project_id: ProjectId,
    /// Publication language.
    pub language_code: LanguageCode,
    /// Slot the video goes live at.
    pub publish_at: DateTime<Utc>,
}

/// Scheduled publication of a project's video to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTask {
    id: PublishTaskId,
    user_id: UserId,
    channel_id: ChannelId,
    project_id: ProjectId,
    language_code: LanguageCode,
    publish_at: DateTime<Utc>,
    status: PublishTaskStatus,
    provider_task_id: Option<ProviderTaskId>,
    provider_response: Option<Value>,
    error_message: Option<String>,
    claimed_by: Option<DaemonId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted publish task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPublishTaskData {
    /// Task identifier.
    pub id: PublishTaskId,
    /// Owning user.
    pub user_id: UserId,
    /// Destination channel.
    pub channel_id: ChannelId,
    /// Published project.
    pub project_id: ProjectId,
    /// Publication language.
    pub language_code: LanguageCode,
    /// Publication slot.
    pub publish_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: PublishTaskStatus,
    /// Provider-side task identifier.
    pub provider_task_id: Option<ProviderTaskId>,
    /// Last provider response.
    pub provider_response: Option<Value>,
    /// Last error reported by a worker.
    pub error_message: Option<String>,
    /// Worker that last claimed the task.
    pub claimed_by: Option<DaemonId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Status change requested by a worker or the owning user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTransition {
    status: PublishTaskStatus,
    provider_task_id: Option<ProviderTaskId>,
    provider_response: Option<Value>,
    error_message: Option<String>,
}

impl TaskTransition {
    /// Requests a move to `status`.
    #[must_use]
    pub const fn to(status: PublishTaskStatus) -> Self {
        Self {
            status,
            provider_task_id: None,
            provider_response: None,
            error_message: None,
        }
    }

    /// Attaches the provider's task identifier.
    #[must_use]
    pub fn with_provider_task_id(mut self, provider_task_id: ProviderTaskId) -> Self {
        self.provider_task_id = Some(provider_task_id);
        self
    }

    /// Attaches the provider's response body.
    #[must_use]
    pub fn with_provider_response(mut self, response: Value) -> Self {
        self.provider_response = Some(response);
        self
    }

    /// Attaches an error message.
    #[must_use]
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Returns the requested status.
    #[must_use]
    pub const fn status(&self) -> PublishTaskStatus {
        self.status
    }
}

/// Field changes applied together with a status change.
///
/// `None` fields keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    /// New status.
    pub status: PublishTaskStatus,
    /// Provider task identifier to record.
    pub provider_task_id: Option<ProviderTaskId>,
    /// Provider response to record.
    pub provider_response: Option<Value>,
    /// Error message to record.
    pub error_message: Option<String>,
    /// Claiming worker to record.
    pub claimed_by: Option<DaemonId>,
}

impl TaskUpdate {
    /// Creates an update that only changes the status.
    #[must_use]
    pub const fn status_only(status: PublishTaskStatus) -> Self {
        Self {
            status,
            provider_task_id: None,
            provider_response: None,
            error_message: None,
            claimed_by: None,
        }
    }
}

/// Write required to apply a [`TaskTransition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionPlan {
    /// The task must still be in `expected_from` when `update` lands.
    Apply {
        /// Status observed when planning.
        expected_from: PublishTaskStatus,
        /// Changes to apply.
        update: TaskUpdate,
    },
    /// The task already reflects the transition.
    NoOp,
}

impl PublishTask {
    /// Creates a pending publish task.
    #[must_use]
    pub fn new(input: NewPublishTask, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: PublishTaskId::new(),
            user_id: input.user_id,
            channel_id: input.channel_id,
            project_id: input.project_id,
            language_code: input.language_code,
            publish_at: input.publish_at,
            status: PublishTaskStatus::Pending,
            provider_task_id: None,
            provider_response: None,
            error_message: None,
            claimed_by: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedPublishTaskData) -> Self {
        Self {
            id: data.id,
            user_id: data.user_id,
            channel_id: data.channel_id,
            project_id: data.project_id,
            language_code: data.language_code,
            publish_at: data.publish_at,
            status: data.status,
            provider_task_id: data.provider_task_id,
            provider_response: data.provider_response,
            error_message: data.error_message,
            claimed_by: data.claimed_by,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> PublishTaskId {
        self.id
    }

    /// Returns the owning user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the destination channel.
    #[must_use]
    pub const fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Returns the published project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the publication language.
    #[must_use]
    pub const fn language_code(&self) -> &LanguageCode {
        &self.language_code
    }

    /// Returns the publication slot.
    #[must_use]
    pub const fn publish_at(&self) -> DateTime<Utc> {
        self.publish_at
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> PublishTaskStatus {
        self.status
    }

    /// Returns the provider-side task identifier.
    #[must_use]
    pub const fn provider_task_id(&self) -> Option<&ProviderTaskId> {
        self.provider_task_id.as_ref()
    }

    /// Returns the last provider response.
    #[must_use]
    pub const fn provider_response(&self) -> Option<&Value> {
        self.provider_response.as_ref()
    }

    /// Returns the last reported error.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the worker that last claimed the task.
    #[must_use]
    pub const fn claimed_by(&self) -> Option<&DaemonId> {
        self.claimed_by.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Decides how `transition` applies to this task.
    ///
    /// Repeating `scheduled` with the same provider task, a terminal status,
    /// or a cleanup request the task already has is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PublishDomainError::InvalidTransition`] for moves outside the
    /// lifecycle, [`PublishDomainError::MissingProviderTaskId`] when
    /// scheduling without a provider task,
    /// [`PublishDomainError::ProviderTaskConflict`] when re-scheduling under a
    /// different provider task, and [`PublishDomainError::NothingToCleanUp`]
    /// when requesting cleanup of a task the provider never accepted.
    pub fn plan_transition(
        &self,
        transition: &TaskTransition,
    ) -> Result<TransitionPlan, PublishDomainError> {
        let target = transition.status;
        if self.status == target {
            return self.plan_repeat(transition);
        }
        if !self.status.can_transition_to(target) {
            return Err(PublishDomainError::InvalidTransition {
                task_id: self.id,
                from: self.status,
                to: target,
            });
        }

        let mut update = TaskUpdate::status_only(target);
        match target {
            PublishTaskStatus::Scheduled => {
                let provider_task_id = transition
                    .provider_task_id
                    .clone()
                    .ok_or(PublishDomainError::MissingProviderTaskId(self.id))?;
                update.provider_task_id = Some(provider_task_id);
                update.provider_response.clone_from(&transition.provider_response);
            }
            PublishTaskStatus::CleanupPending if self.provider_task_id.is_none() => {
                return Err(PublishDomainError::NothingToCleanUp(self.id));
            }
            PublishTaskStatus::Retry
            | PublishTaskStatus::Failed
            | PublishTaskStatus::CleanupFailed => {
                update.error_message.clone_from(&transition.error_message);
                update.provider_response.clone_from(&transition.provider_response);
            }
            _ => {
                update.provider_response.clone_from(&transition.provider_response);
            }
        }
        Ok(TransitionPlan::Apply {
            expected_from: self.status,
            update,
        })
    }

    fn plan_repeat(&self, transition: &TaskTransition) -> Result<TransitionPlan, PublishDomainError> {
        match (self.status, &self.provider_task_id, &transition.provider_task_id) {
            (PublishTaskStatus::Scheduled, Some(existing), Some(reported))
                if existing != reported =>
            {
                Err(PublishDomainError::ProviderTaskConflict {
                    task_id: self.id,
                    existing: existing.to_string(),
                    reported: reported.to_string(),
                })
            }
            (status, _, _)
                if status.is_terminal()
                    || matches!(
                        status,
                        PublishTaskStatus::Scheduled | PublishTaskStatus::CleanupPending
                    ) =>
            {
                Ok(TransitionPlan::NoOp)
            }
            (status, _, _) => Err(PublishDomainError::InvalidTransition {
                task_id: self.id,
                from: status,
                to: transition.status,
            }),
        }
    }

    /// Applies an update whose precondition the store has checked.
    pub(crate) fn apply_update(&mut self, update: &TaskUpdate, at: DateTime<Utc>) {
        self.status = update.status;
        if let Some(provider_task_id) = &update.provider_task_id {
            self.provider_task_id = Some(provider_task_id.clone());
        }
        if let Some(response) = &update.provider_response {
            self.provider_response = Some(response.clone());
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(worker) = &update.claimed_by {
            self.claimed_by = Some(worker.clone());
        }
        self.updated_at = at;
    }
}
