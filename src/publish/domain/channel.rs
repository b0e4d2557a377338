//! Publish channels and their credentials.

use super::{ChannelId, ParseChannelProviderError, PublishDomainError, UserId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// External platform a channel publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelProvider {
    /// `YouTube`.
    Youtube,
    /// `TikTok`.
    Tiktok,
    /// Instagram.
    Instagram,
}

impl ChannelProvider {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Tiktok => "tiktok",
            Self::Instagram => "instagram",
        }
    }
}

impl fmt::Display for ChannelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ChannelProvider {
    type Error = ParseChannelProviderError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "youtube" => Ok(Self::Youtube),
            "tiktok" => Ok(Self::Tiktok),
            "instagram" => Ok(Self::Instagram),
            _ => Err(ParseChannelProviderError(value.to_owned())),
        }
    }
}

/// Opaque credential material for a provider account.
///
/// `Debug` output is redacted so credentials never reach logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelCredentials(Value);

impl ChannelCredentials {
    /// Wraps provider credential material.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Returns the credential material.
    #[must_use]
    pub const fn expose(&self) -> &Value {
        &self.0
    }
}

impl fmt::Debug for ChannelCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelCredentials(<redacted>)")
    }
}

/// Fields required to register a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    /// Owning user.
    pub user_id: UserId,
    /// Platform.
    pub provider: ChannelProvider,
    /// Channel identifier on the platform.
    pub external_channel_id: String,
    /// Credential material.
    pub credentials: ChannelCredentials,
    /// Free-form provider metadata.
    pub metadata: Value,
}

/// External destination videos are published to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishChannel {
    id: ChannelId,
    user_id: UserId,
    provider: ChannelProvider,
    external_channel_id: String,
    credentials: ChannelCredentials,
    metadata: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedChannelData {
    /// Channel identifier.
    pub id: ChannelId,
    /// Owning user.
    pub user_id: UserId,
    /// Platform.
    pub provider: ChannelProvider,
    /// Channel identifier on the platform.
    pub external_channel_id: String,
    /// Credential material.
    pub credentials: ChannelCredentials,
    /// Provider metadata.
    pub metadata: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl PublishChannel {
    /// Creates a channel from registration input.
    ///
    /// # Errors
    ///
    /// Returns [`PublishDomainError::EmptyExternalChannelId`] when the
    /// platform identifier is blank.
    pub fn new(input: NewChannel, clock: &impl Clock) -> Result<Self, PublishDomainError> {
        let external_channel_id = input.external_channel_id.trim().to_owned();
        if external_channel_id.is_empty() {
            return Err(PublishDomainError::EmptyExternalChannelId);
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: ChannelId::new(),
            user_id: input.user_id,
            provider: input.provider,
            external_channel_id,
            credentials: input.credentials,
            metadata: input.metadata,
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a channel from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedChannelData) -> Self {
        Self {
            id: data.id,
            user_id: data.user_id,
            provider: data.provider,
            external_channel_id: data.external_channel_id,
            credentials: data.credentials,
            metadata: data.metadata,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the channel identifier.
    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }

    /// Returns the owning user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the platform.
    #[must_use]
    pub const fn provider(&self) -> ChannelProvider {
        self.provider
    }

    /// Returns the platform's channel identifier.
    #[must_use]
    pub fn external_channel_id(&self) -> &str {
        &self.external_channel_id
    }

    /// Returns the credential material.
    #[must_use]
    pub const fn credentials(&self) -> &ChannelCredentials {
        &self.credentials
    }

    /// Returns provider metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Value {
        &self.metadata
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

    /// Replaces the credential material.
    pub(crate) fn replace_credentials(&mut self, credentials: ChannelCredentials, at: DateTime<Utc>) {
        self.credentials = credentials;
        self.updated_at = at;
    }
}
