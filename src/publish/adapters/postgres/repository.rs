//! `PostgreSQL` publish store.
//!
//! Slot uniqueness rests on the partial unique index
//! `idx_publish_tasks_channel_slot`; acquisitions lock candidate rows with
//! `FOR UPDATE SKIP LOCKED` so concurrent workers never take the same task.

use super::{
    models::{ChannelRow, NewChannelRow, NewTaskRow, TaskChangeset, TaskRow},
    schema::{publish_channels, publish_tasks},
};
use crate::lease::domain::{DaemonId, ProjectId};
use crate::publish::{
    domain::{
        ChannelCredentials, ChannelId, ChannelProvider, LanguageCode, PersistedChannelData,
        PersistedPublishTaskData, ProviderTaskId, PublishChannel, PublishTask, PublishTaskId,
        PublishTaskStatus, TaskUpdate, UserId,
    },
    ports::{
        PublishStore, PublishStoreError, PublishStoreResult, TaskAcquisition, TaskStatusWrite,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by publish adapters.
pub type PublishPgPool = Pool<ConnectionManager<PgConnection>>;

const CHANNEL_SLOT_INDEX: &str = "idx_publish_tasks_channel_slot";

/// `PostgreSQL`-backed publish store.
#[derive(Debug, Clone)]
pub struct PostgresPublishStore {
    pool: PublishPgPool,
}

impl PostgresPublishStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: PublishPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> PublishStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> PublishStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(PublishStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(PublishStoreError::persistence)?
    }
}

#[async_trait]
impl PublishStore for PostgresPublishStore {
    async fn store_channel(&self, channel: &PublishChannel) -> PublishStoreResult<()> {
        let channel_id = channel.id();
        let new_row = to_new_channel_row(channel);
        self.run_blocking(move |connection| {
            diesel::insert_into(publish_channels::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        PublishStoreError::DuplicateChannel(channel_id)
                    }
                    _ => PublishStoreError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_channel(&self, id: ChannelId) -> PublishStoreResult<Option<PublishChannel>> {
        self.run_blocking(move |connection| {
            publish_channels::table
                .filter(publish_channels::id.eq(id.into_inner()))
                .select(ChannelRow::as_select())
                .first::<ChannelRow>(connection)
                .optional()
                .map_err(PublishStoreError::persistence)?
                .map(row_to_channel)
                .transpose()
        })
        .await
    }

    async fn update_channel_credentials(
        &self,
        id: ChannelId,
        credentials: &ChannelCredentials,
        at: DateTime<Utc>,
    ) -> PublishStoreResult<PublishChannel> {
        let material = credentials.expose().clone();
        self.run_blocking(move |connection| {
            let row = diesel::update(
                publish_channels::table.filter(publish_channels::id.eq(id.into_inner())),
            )
            .set((
                publish_channels::credentials.eq(material),
                publish_channels::updated_at.eq(at),
            ))
            .returning(ChannelRow::as_returning())
            .get_result::<ChannelRow>(connection)
            .optional()
            .map_err(PublishStoreError::persistence)?
            .ok_or(PublishStoreError::ChannelNotFound(id))?;
            row_to_channel(row)
        })
        .await
    }

    async fn insert_task(&self, task: &PublishTask) -> PublishStoreResult<()> {
        let task_id = task.id();
        let channel_id = task.channel_id();
        let publish_at = task.publish_at();
        let new_row = to_new_task_row(task);
        self.run_blocking(move |connection| {
            diesel::insert_into(publish_tasks::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                        if is_slot_violation(info.as_ref()) =>
                    {
                        PublishStoreError::SlotTaken {
                            channel_id,
                            publish_at,
                        }
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        PublishStoreError::DuplicateTask(task_id)
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                        PublishStoreError::ChannelNotFound(channel_id)
                    }
                    _ => PublishStoreError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_task(&self, id: PublishTaskId) -> PublishStoreResult<Option<PublishTask>> {
        self.run_blocking(move |connection| {
            load_task(connection, id)?.map(row_to_task).transpose()
        })
        .await
    }

    async fn latest_task_for(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        language_code: &LanguageCode,
        statuses: &[PublishTaskStatus],
    ) -> PublishStoreResult<Option<PublishTask>> {
        let language = language_code.as_str().to_owned();
        let status_names = status_names(statuses);
        self.run_blocking(move |connection| {
            publish_tasks::table
                .filter(publish_tasks::user_id.eq(user_id.into_inner()))
                .filter(publish_tasks::channel_id.eq(channel_id.into_inner()))
                .filter(publish_tasks::language_code.eq(language))
                .filter(publish_tasks::status.eq_any(status_names))
                .order((
                    publish_tasks::publish_at.desc(),
                    publish_tasks::created_at.desc(),
                    publish_tasks::id.desc(),
                ))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(PublishStoreError::persistence)?
                .map(row_to_task)
                .transpose()
        })
        .await
    }

    async fn blocking_task_in_window(
        &self,
        channel_id: ChannelId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PublishStoreResult<Option<PublishTask>> {
        let blocking = status_names(&PublishTaskStatus::BLOCKING);
        self.run_blocking(move |connection| {
            publish_tasks::table
                .filter(publish_tasks::channel_id.eq(channel_id.into_inner()))
                .filter(publish_tasks::status.eq_any(blocking))
                .filter(publish_tasks::publish_at.ge(start))
                .filter(publish_tasks::publish_at.le(end))
                .order((publish_tasks::publish_at.asc(), publish_tasks::id.asc()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()
                .map_err(PublishStoreError::persistence)?
                .map(row_to_task)
                .transpose()
        })
        .await
    }

    async fn transition_task(
        &self,
        write: &TaskStatusWrite,
    ) -> PublishStoreResult<Option<PublishTask>> {
        let task_id = write.task_id;
        let expected = status_names(&write.expected);
        let changeset = to_changeset(&write.update, write.at);
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                publish_tasks::table
                    .filter(publish_tasks::id.eq(task_id.into_inner()))
                    .filter(publish_tasks::status.eq_any(expected)),
            )
            .set(&changeset)
            .returning(TaskRow::as_returning())
            .get_result::<TaskRow>(connection)
            .optional()
            .map_err(PublishStoreError::persistence)?;
            match updated {
                Some(row) => row_to_task(row).map(Some),
                None if load_task(connection, task_id)?.is_none() => {
                    Err(PublishStoreError::TaskNotFound(task_id))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_tasks(
        &self,
        statuses: &[PublishTaskStatus],
        limit: usize,
    ) -> PublishStoreResult<Vec<PublishTask>> {
        let status_filter = status_names(statuses);
        let row_limit = i64::try_from(limit).map_err(PublishStoreError::persistence)?;
        self.run_blocking(move |connection| {
            let rows = publish_tasks::table
                .filter(publish_tasks::status.eq_any(status_filter))
                .order((publish_tasks::created_at.asc(), publish_tasks::id.asc()))
                .limit(row_limit)
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)
                .map_err(PublishStoreError::persistence)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn acquire_tasks(
        &self,
        acquisition: &TaskAcquisition,
    ) -> PublishStoreResult<Vec<PublishTask>> {
        let from = status_names(&acquisition.from)
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        let target = acquisition.to.as_str();
        let worker = acquisition.claimed_by.as_str().to_owned();
        let at = acquisition.at;
        let row_limit = i64::try_from(acquisition.limit).map_err(PublishStoreError::persistence)?;
        self.run_blocking(move |connection| {
            let mut rows = diesel::sql_query(concat!(
                "UPDATE publish_tasks SET status = $1, claimed_by = $2, updated_at = $3 ",
                "WHERE id IN (",
                "SELECT id FROM publish_tasks WHERE status = ANY($4) ",
                "ORDER BY created_at, id LIMIT $5 FOR UPDATE SKIP LOCKED",
                ") RETURNING id, user_id, channel_id, project_id, language_code, publish_at, ",
                "status, provider_task_id, provider_response, error_message, claimed_by, ",
                "created_at, updated_at",
            ))
            .bind::<diesel::sql_types::Text, _>(target)
            .bind::<diesel::sql_types::Text, _>(worker)
            .bind::<diesel::sql_types::Timestamptz, _>(at)
            .bind::<diesel::sql_types::Array<diesel::sql_types::Text>, _>(from)
            .bind::<diesel::sql_types::BigInt, _>(row_limit)
            .load::<TaskRow>(connection)
            .map_err(PublishStoreError::persistence)?;
            rows.sort_by_key(|row| (row.created_at, row.id));
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }
}

fn load_task(
    connection: &mut PgConnection,
    id: PublishTaskId,
) -> PublishStoreResult<Option<TaskRow>> {
    publish_tasks::table
        .filter(publish_tasks::id.eq(id.into_inner()))
        .select(TaskRow::as_select())
        .first::<TaskRow>(connection)
        .optional()
        .map_err(PublishStoreError::persistence)
}

fn status_names(statuses: &[PublishTaskStatus]) -> Vec<&'static str> {
    statuses.iter().copied().map(PublishTaskStatus::as_str).collect()
}

fn is_slot_violation(info: &dyn DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == CHANNEL_SLOT_INDEX)
}

fn to_changeset(update: &TaskUpdate, at: DateTime<Utc>) -> TaskChangeset {
    TaskChangeset {
        status: update.status.as_str().to_owned(),
        provider_task_id: update
            .provider_task_id
            .as_ref()
            .map(|provider_task| provider_task.as_str().to_owned()),
        provider_response: update.provider_response.clone(),
        error_message: update.error_message.clone(),
        claimed_by: update
            .claimed_by
            .as_ref()
            .map(|worker| worker.as_str().to_owned()),
        updated_at: at,
    }
}

fn to_new_channel_row(channel: &PublishChannel) -> NewChannelRow {
    NewChannelRow {
        id: channel.id().into_inner(),
        user_id: channel.user_id().into_inner(),
        provider: channel.provider().as_str().to_owned(),
        external_channel_id: channel.external_channel_id().to_owned(),
        credentials: channel.credentials().expose().clone(),
        metadata: channel.metadata().clone(),
        created_at: channel.created_at(),
        updated_at: channel.updated_at(),
    }
}

fn to_new_task_row(task: &PublishTask) -> NewTaskRow {
    NewTaskRow {
        id: task.id().into_inner(),
        user_id: task.user_id().into_inner(),
        channel_id: task.channel_id().into_inner(),
        project_id: task.project_id().into_inner(),
        language_code: task.language_code().as_str().to_owned(),
        publish_at: task.publish_at(),
        status: task.status().as_str().to_owned(),
        provider_task_id: task
            .provider_task_id()
            .map(|provider_task| provider_task.as_str().to_owned()),
        provider_response: task.provider_response().cloned(),
        error_message: task.error_message().map(str::to_owned),
        claimed_by: task.claimed_by().map(|worker| worker.as_str().to_owned()),
        created_at: task.created_at(),
        updated_at: task.updated_at(),
    }
}

fn row_to_channel(row: ChannelRow) -> PublishStoreResult<PublishChannel> {
    let ChannelRow {
        id,
        user_id,
        provider: persisted_provider,
        external_channel_id,
        credentials,
        metadata,
        created_at,
        updated_at,
    } = row;

    let provider = ChannelProvider::try_from(persisted_provider.as_str())
        .map_err(PublishStoreError::persistence)?;

    Ok(PublishChannel::from_persisted(PersistedChannelData {
        id: ChannelId::from_uuid(id),
        user_id: UserId::from_uuid(user_id),
        provider,
        external_channel_id,
        credentials: ChannelCredentials::new(credentials),
        metadata,
        created_at,
        updated_at,
    }))
}

fn row_to_task(row: TaskRow) -> PublishStoreResult<PublishTask> {
    let TaskRow {
        id,
        user_id,
        channel_id,
        project_id,
        language_code: persisted_language,
        publish_at,
        status: persisted_status,
        provider_task_id: persisted_provider_task,
        provider_response,
        error_message,
        claimed_by: persisted_worker,
        created_at,
        updated_at,
    } = row;

    let language_code =
        LanguageCode::new(persisted_language).map_err(PublishStoreError::persistence)?;
    let status = PublishTaskStatus::try_from(persisted_status.as_str())
        .map_err(PublishStoreError::persistence)?;
    let provider_task_id = persisted_provider_task
        .map(ProviderTaskId::new)
        .transpose()
        .map_err(PublishStoreError::persistence)?;
    let claimed_by = persisted_worker
        .map(DaemonId::new)
        .transpose()
        .map_err(PublishStoreError::persistence)?;

    Ok(PublishTask::from_persisted(PersistedPublishTaskData {
        id: PublishTaskId::from_uuid(id),
        user_id: UserId::from_uuid(user_id),
        channel_id: ChannelId::from_uuid(channel_id),
        project_id: ProjectId::from_uuid(project_id),
        language_code,
        publish_at,
        status,
        provider_task_id,
        provider_response,
        error_message,
        claimed_by,
        created_at,
        updated_at,
    }))
}
