//! Diesel row models for publish persistence.

use super::schema::{publish_channels, publish_tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for channel records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = publish_channels)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChannelRow {
    /// Channel identifier.
    pub id: uuid::Uuid,
    /// Owning user.
    pub user_id: uuid::Uuid,
    /// External platform.
    pub provider: String,
    /// Platform channel identifier.
    pub external_channel_id: String,
    /// Credential material.
    pub credentials: Value,
    /// Provider metadata.
    pub metadata: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model for channel records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = publish_channels)]
pub struct NewChannelRow {
    /// Channel identifier.
    pub id: uuid::Uuid,
    /// Owning user.
    pub user_id: uuid::Uuid,
    /// External platform.
    pub provider: String,
    /// Platform channel identifier.
    pub external_channel_id: String,
    /// Credential material.
    pub credentials: Value,
    /// Provider metadata.
    pub metadata: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, QueryableByName, Selectable)]
#[diesel(table_name = publish_tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Task identifier.
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub id: uuid::Uuid,
    /// Owning user.
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub user_id: uuid::Uuid,
    /// Destination channel.
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub channel_id: uuid::Uuid,
    /// Published project.
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub project_id: uuid::Uuid,
    /// Publication language.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub language_code: String,
    /// Publication slot.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub publish_at: DateTime<Utc>,
    /// Lifecycle status.
    #[diesel(sql_type = diesel::sql_types::Varchar)]
    pub status: String,
    /// Provider-side task identifier.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Varchar>)]
    pub provider_task_id: Option<String>,
    /// Last provider response.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Jsonb>)]
    pub provider_response: Option<Value>,
    /// Last reported error.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Text>)]
    pub error_message: Option<String>,
    /// Worker that last claimed the task.
    #[diesel(sql_type = diesel::sql_types::Nullable<diesel::sql_types::Varchar>)]
    pub claimed_by: Option<String>,
    /// Creation timestamp.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    #[diesel(sql_type = diesel::sql_types::Timestamptz)]
    pub updated_at: DateTime<Utc>,
}

/// Insert model for task records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = publish_tasks)]
pub struct NewTaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Owning user.
    pub user_id: uuid::Uuid,
    /// Destination channel.
    pub channel_id: uuid::Uuid,
    /// Published project.
    pub project_id: uuid::Uuid,
    /// Publication language.
    pub language_code: String,
    /// Publication slot.
    pub publish_at: DateTime<Utc>,
    /// Lifecycle status.
    pub status: String,
    /// Provider-side task identifier.
    pub provider_task_id: Option<String>,
    /// Last provider response.
    pub provider_response: Option<Value>,
    /// Last reported error.
    pub error_message: Option<String>,
    /// Worker that last claimed the task.
    pub claimed_by: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Status write for task records; `None` fields are left untouched.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = publish_tasks)]
pub struct TaskChangeset {
    /// New status.
    pub status: String,
    /// Provider-side task identifier.
    pub provider_task_id: Option<String>,
    /// Provider response.
    pub provider_response: Option<Value>,
    /// Error message.
    pub error_message: Option<String>,
    /// Claiming worker.
    pub claimed_by: Option<String>,
    /// Update timestamp.
    pub updated_at: DateTime<Utc>,
}
