//! Diesel schema for publish persistence.

diesel::table! {
    /// External publishing destinations.
    publish_channels (id) {
        /// Channel identifier.
        id -> Uuid,
        /// Owning user.
        user_id -> Uuid,
        /// External platform.
        #[max_length = 50]
        provider -> Varchar,
        /// Platform channel identifier.
        #[max_length = 255]
        external_channel_id -> Varchar,
        /// Opaque credential material.
        credentials -> Jsonb,
        /// Provider metadata.
        metadata -> Jsonb,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Scheduled publications.
    publish_tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Owning user.
        user_id -> Uuid,
        /// Destination channel.
        channel_id -> Uuid,
        /// Published project.
        project_id -> Uuid,
        /// Publication language.
        #[max_length = 35]
        language_code -> Varchar,
        /// Publication slot.
        publish_at -> Timestamptz,
        /// Lifecycle status.
        #[max_length = 50]
        status -> Varchar,
        /// Provider-side task identifier.
        #[max_length = 255]
        provider_task_id -> Nullable<Varchar>,
        /// Last provider response.
        provider_response -> Nullable<Jsonb>,
        /// Last reported error.
        error_message -> Nullable<Text>,
        /// Worker that last claimed the task.
        #[max_length = 128]
        claimed_by -> Nullable<Varchar>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(publish_tasks -> publish_channels (channel_id));
diesel::allow_tables_to_appear_in_same_query!(publish_channels, publish_tasks);
