//! Diesel schema for lease persistence.

diesel::table! {
    /// Video projects and their daemon lock.
    projects (id) {
        /// Project identifier.
        id -> Uuid,
        /// Pipeline stage.
        #[max_length = 50]
        status -> Varchar,
        /// Daemon currently holding the project lock.
        #[max_length = 128]
        current_daemon_id -> Nullable<Varchar>,
        /// When the current lock was acquired.
        current_daemon_locked_at -> Nullable<Timestamptz>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Pipeline jobs leased to daemons.
    jobs (id) {
        /// Job identifier.
        id -> Uuid,
        /// Owning project.
        project_id -> Uuid,
        /// Pipeline work type.
        #[max_length = 50]
        job_type -> Varchar,
        /// Lifecycle status.
        #[max_length = 50]
        status -> Varchar,
        /// Daemon owning the job once claimed.
        #[max_length = 128]
        daemon_id -> Nullable<Varchar>,
        /// Opaque worker payload.
        payload -> Jsonb,
        /// Reason recorded when the sweeper fails the job.
        failure_reason -> Nullable<Text>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last progress timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(jobs -> projects (project_id));
diesel::allow_tables_to_appear_in_same_query!(projects, jobs);
