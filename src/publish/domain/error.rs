//! Error types for publish domain validation and parsing.

use super::{PublishTaskId, PublishTaskStatus};
use thiserror::Error;

/// Errors returned while validating publish values and task transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishDomainError {
    /// The language code is not of the form `en`, `pt-BR`, or `zh-Hant-TW`.
    #[error("invalid language code '{0}'")]
    InvalidLanguageCode(String),

    /// Provider task identifiers must not be blank.
    #[error("provider task identifier must not be empty")]
    EmptyProviderTaskId,

    /// The external channel identifier must not be blank.
    #[error("external channel identifier must not be empty")]
    EmptyExternalChannelId,

    /// The base time of day is not `HH:MM` on a 24-hour clock.
    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTimeOfDay(String),

    /// Cadence must be at least one day.
    #[error("cadence must be at least one day, got {0}")]
    InvalidCadence(u32),

    /// The slot conflict window must not be negative.
    #[error("conflict window must not be negative")]
    NegativeConflictWindow,

    /// Probe and attempt bounds must be at least one.
    #[error("{0} must be at least 1")]
    ZeroSchedulingBound(&'static str),

    /// The requested status change is not part of the publish lifecycle.
    #[error("invalid publish task transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        /// Task identifier.
        task_id: PublishTaskId,
        /// Current status.
        from: PublishTaskStatus,
        /// Requested status.
        to: PublishTaskStatus,
    },

    /// Moving to `scheduled` requires the provider's task identifier.
    #[error("publish task {0} cannot be scheduled without a provider task identifier")]
    MissingProviderTaskId(PublishTaskId),

    /// The task is already scheduled under a different provider task.
    #[error("publish task {task_id} is scheduled as '{existing}', not '{reported}'")]
    ProviderTaskConflict {
        /// Task identifier.
        task_id: PublishTaskId,
        /// Provider task identifier already recorded.
        existing: String,
        /// Provider task identifier in the report.
        reported: String,
    },

    /// Cleanup only applies to tasks the provider knows about.
    #[error("publish task {0} has no provider task to clean up")]
    NothingToCleanUp(PublishTaskId),
}

/// Error returned while parsing publish task statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown publish task status: {0}")]
pub struct ParsePublishTaskStatusError(pub String);

/// Error returned while parsing channel providers from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown channel provider: {0}")]
pub struct ParseChannelProviderError(pub String);
