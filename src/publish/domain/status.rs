//! Publish task lifecycle statuses.

use super::ParsePublishTaskStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a publish task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishTaskStatus {
    /// Waiting for a publish worker.
    Pending,
    /// Waiting for another publish attempt after a recoverable error.
    Retry,
    /// Claimed by a publish worker.
    Processing,
    /// Accepted by the provider for its publish time.
    Scheduled,
    /// Published.
    Completed,
    /// Publishing failed for good.
    Failed,
    /// Waiting for a cleanup worker to remove the provider-side upload.
    CleanupPending,
    /// Claimed by a cleanup worker.
    CleanupProcessing,
    /// Provider-side upload removed.
    CleanupDone,
    /// Provider-side upload could not be removed.
    CleanupFailed,
}

impl PublishTaskStatus {
    /// Statuses that occupy a channel slot.
    pub const BLOCKING: [Self; 4] = [Self::Pending, Self::Retry, Self::Processing, Self::Scheduled];

    /// Statuses that count as publishing history when computing the next slot.
    pub const HISTORY: [Self; 5] = [
        Self::Pending,
        Self::Retry,
        Self::Processing,
        Self::Scheduled,
        Self::Completed,
    ];

    /// Statuses a publish worker may claim.
    pub const PUBLISH_CLAIMABLE: [Self; 2] = [Self::Pending, Self::Retry];

    /// Statuses a cleanup worker may claim.
    pub const CLEANUP_CLAIMABLE: [Self; 1] = [Self::CleanupPending];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retry => "retry",
            Self::Processing => "processing",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::CleanupPending => "cleanup_pending",
            Self::CleanupProcessing => "cleanup_processing",
            Self::CleanupDone => "cleanup_done",
            Self::CleanupFailed => "cleanup_failed",
        }
    }

    /// Returns whether a task in this status occupies its channel slot.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Retry | Self::Processing | Self::Scheduled
        )
    }

    /// Returns whether this status ends its lifecycle phase.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::CleanupDone | Self::CleanupFailed
        )
    }

    /// Returns whether the lifecycle allows moving from `self` to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending | Self::Retry, Self::Processing)
                | (
                    Self::Processing,
                    Self::Scheduled | Self::Retry | Self::Failed
                )
                | (Self::Scheduled, Self::Completed | Self::CleanupPending)
                | (Self::Failed, Self::CleanupPending)
                | (Self::CleanupPending, Self::CleanupProcessing)
                | (
                    Self::CleanupProcessing,
                    Self::CleanupDone | Self::CleanupFailed
                )
        )
    }
}

impl fmt::Display for PublishTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PublishTaskStatus {
    type Error = ParsePublishTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "retry" => Ok(Self::Retry),
            "processing" => Ok(Self::Processing),
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cleanup_pending" => Ok(Self::CleanupPending),
            "cleanup_processing" => Ok(Self::CleanupProcessing),
            "cleanup_done" => Ok(Self::CleanupDone),
            "cleanup_failed" => Ok(Self::CleanupFailed),
            _ => Err(ParsePublishTaskStatusError(value.to_owned())),
        }
    }
}
