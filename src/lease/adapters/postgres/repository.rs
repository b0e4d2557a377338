//! `PostgreSQL` lease store.
//!
//! Claims and reports run inside one transaction each. The project lock is
//! taken with a single conditional `UPDATE`, so concurrent claimers are
//! serialized by the row lock and only the first one sees a matching row.
//! The partial unique index `idx_jobs_one_running_per_project` backs the
//! one-running-job rule for the same-daemon case.

use super::{
    models::{JobRow, NewJobRow, NewProjectRow, ProjectRow},
    schema::{jobs, projects},
};
use crate::lease::{
    domain::{
        ClaimOutcome, ClaimRejection, DaemonId, ForcedRelease, Job, JobId, JobStatus, JobType,
        PersistedJobData, PersistedProjectData, Project, ProjectId, ProjectLock, ProjectStage,
        ReportPlan, evaluate_claim,
    },
    ports::{
        JobStatusChange, JobStatusChangeOutcome, LeaseStore, LeaseStoreError, LeaseStoreResult,
        StaleLeaseQuery,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by lease adapters.
pub type LeasePgPool = Pool<ConnectionManager<PgConnection>>;

const RUNNING_JOB_INDEX: &str = "idx_jobs_one_running_per_project";

/// `PostgreSQL`-backed lease store.
#[derive(Debug, Clone)]
pub struct PostgresLeaseStore {
    pool: LeasePgPool,
}

impl PostgresLeaseStore {
    /// Creates a new store from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: LeasePgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> LeaseStoreResult<T>
    where
        F: FnOnce(&mut PgConnection) -> LeaseStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(LeaseStoreError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(LeaseStoreError::persistence)?
    }
}

/// Error type threaded through lease transactions.
enum TxError {
    Rejected(ClaimRejection),
    Store(LeaseStoreError),
}

impl From<DieselError> for TxError {
    fn from(err: DieselError) -> Self {
        Self::Store(LeaseStoreError::persistence(err))
    }
}

impl From<LeaseStoreError> for TxError {
    fn from(err: LeaseStoreError) -> Self {
        Self::Store(err)
    }
}

impl TxError {
    fn into_store(self) -> LeaseStoreError {
        match self {
            Self::Store(err) => err,
            Self::Rejected(rejection) => {
                LeaseStoreError::persistence(std::io::Error::other(rejection.to_string()))
            }
        }
    }
}

#[async_trait]
impl LeaseStore for PostgresLeaseStore {
    async fn store_project(&self, project: &Project) -> LeaseStoreResult<()> {
        let project_id = project.id();
        let new_row = to_new_project_row(project);
        self.run_blocking(move |connection| {
            diesel::insert_into(projects::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        LeaseStoreError::DuplicateProject(project_id)
                    }
                    _ => LeaseStoreError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_project(&self, id: ProjectId) -> LeaseStoreResult<Option<Project>> {
        self.run_blocking(move |connection| {
            load_project(connection, id)?.map(row_to_project).transpose()
        })
        .await
    }

    async fn change_project_stage(
        &self,
        id: ProjectId,
        expected: ProjectStage,
        target: ProjectStage,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<bool> {
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                projects::table
                    .filter(projects::id.eq(id.into_inner()))
                    .filter(projects::status.eq(expected.as_str())),
            )
            .set((
                projects::status.eq(target.as_str()),
                projects::updated_at.eq(at),
            ))
            .execute(connection)
            .map_err(LeaseStoreError::persistence)?;
            if updated == 1 {
                return Ok(true);
            }
            if load_project(connection, id)?.is_none() {
                return Err(LeaseStoreError::ProjectNotFound(id));
            }
            Ok(false)
        })
        .await
    }

    async fn store_job(&self, job: &Job) -> LeaseStoreResult<()> {
        let job_id = job.id();
        let project_id = job.project_id();
        let new_row = to_new_job_row(job);
        self.run_blocking(move |connection| {
            diesel::insert_into(jobs::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                        LeaseStoreError::ProjectNotFound(project_id)
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        LeaseStoreError::DuplicateJob(job_id)
                    }
                    _ => LeaseStoreError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_job(&self, id: JobId) -> LeaseStoreResult<Option<Job>> {
        self.run_blocking(move |connection| load_job(connection, id)?.map(row_to_job).transpose())
            .await
    }

    async fn try_claim(
        &self,
        job_id: JobId,
        daemon_id: &DaemonId,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<ClaimOutcome> {
        let claimant = daemon_id.clone();
        self.run_blocking(move |connection| {
            let result = connection.transaction::<Job, TxError, _>(|tx| {
                claim_in_transaction(tx, job_id, &claimant, at)
            });
            match result {
                Ok(job) => Ok(ClaimOutcome::Claimed(job)),
                Err(TxError::Rejected(rejection)) => Ok(ClaimOutcome::Rejected(rejection)),
                Err(TxError::Store(err)) => Err(err),
            }
        })
        .await
    }

    async fn apply_status_change(
        &self,
        change: &JobStatusChange,
    ) -> LeaseStoreResult<JobStatusChangeOutcome> {
        let owned_change = change.clone();
        self.run_blocking(move |connection| {
            connection
                .transaction::<JobStatusChangeOutcome, TxError, _>(|tx| {
                    if !apply_job_plan(tx, &owned_change)? {
                        return Ok(JobStatusChangeOutcome {
                            applied: false,
                            lock_released: false,
                        });
                    }
                    let lock_released = owned_change.plan.releases_lock()
                        && release_lock_held_by(
                            tx,
                            owned_change.project_id,
                            &owned_change.daemon_id,
                            owned_change.at,
                        )?;
                    Ok(JobStatusChangeOutcome {
                        applied: true,
                        lock_released,
                    })
                })
                .map_err(TxError::into_store)
        })
        .await
    }

    async fn list_claimable(
        &self,
        daemon_id: &DaemonId,
        limit: usize,
    ) -> LeaseStoreResult<Vec<Job>> {
        let daemon = daemon_id.as_str().to_owned();
        let row_limit = i64::try_from(limit).map_err(LeaseStoreError::persistence)?;
        self.run_blocking(move |connection| {
            let query = format!(
                concat!(
                    "SELECT j.id, j.project_id, j.job_type, j.status, j.daemon_id, j.payload, ",
                    "j.failure_reason, j.created_at, j.updated_at ",
                    "FROM jobs j JOIN projects p ON p.id = j.project_id ",
                    "WHERE j.status = 'queued' ",
                    "AND (j.daemon_id IS NULL OR j.daemon_id = $1) ",
                    "AND (p.current_daemon_id IS NULL OR p.current_daemon_id = $1) ",
                    "AND ({}) ",
                    "ORDER BY j.created_at, j.id ",
                    "LIMIT $2",
                ),
                stage_pairing_predicate(),
            );
            let rows = diesel::sql_query(query)
                .bind::<diesel::sql_types::Text, _>(daemon)
                .bind::<diesel::sql_types::BigInt, _>(row_limit)
                .load::<JobRow>(connection)
                .map_err(LeaseStoreError::persistence)?;
            rows.into_iter().map(row_to_job).collect()
        })
        .await
    }

    async fn has_active_job(
        &self,
        project_id: ProjectId,
        job_type: JobType,
    ) -> LeaseStoreResult<bool> {
        self.run_blocking(move |connection| {
            let active = [JobStatus::Queued.as_str(), JobStatus::Running.as_str()];
            diesel::select(diesel::dsl::exists(
                jobs::table
                    .filter(jobs::project_id.eq(project_id.into_inner()))
                    .filter(jobs::job_type.eq(job_type.as_str()))
                    .filter(jobs::status.eq_any(active)),
            ))
            .get_result::<bool>(connection)
            .map_err(LeaseStoreError::persistence)
        })
        .await
    }

    async fn find_stale(&self, query: &StaleLeaseQuery) -> LeaseStoreResult<Vec<Job>> {
        let row_limit = i64::try_from(query.limit).map_err(LeaseStoreError::persistence)?;
        let cutoff = query.cutoff;
        let project_filter = query.project_id;
        let statuses: Vec<&'static str> =
            query.statuses.iter().copied().map(JobStatus::as_str).collect();
        self.run_blocking(move |connection| {
            let mut select = jobs::table
                .filter(jobs::updated_at.lt(cutoff))
                .filter(jobs::status.eq_any(statuses))
                .select(JobRow::as_select())
                .into_boxed();
            if let Some(project_id) = project_filter {
                select = select.filter(jobs::project_id.eq(project_id.into_inner()));
            }
            let rows = select
                .order((jobs::updated_at.asc(), jobs::created_at.asc(), jobs::id.asc()))
                .limit(row_limit)
                .load::<JobRow>(connection)
                .map_err(LeaseStoreError::persistence)?;
            rows.into_iter().map(row_to_job).collect()
        })
        .await
    }

    async fn fail_stale(
        &self,
        job: &Job,
        reason: &str,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<bool> {
        let job_id = job.id().into_inner();
        let seen_status = job.status().as_str();
        let seen_updated_at = job.updated_at();
        let failure_reason = reason.to_owned();
        self.run_blocking(move |connection| {
            let updated = diesel::update(
                jobs::table
                    .filter(jobs::id.eq(job_id))
                    .filter(jobs::status.eq(seen_status))
                    .filter(jobs::updated_at.eq(seen_updated_at)),
            )
            .set((
                jobs::status.eq(JobStatus::Failed.as_str()),
                jobs::failure_reason.eq(Some(failure_reason)),
                jobs::updated_at.eq(at),
            ))
            .execute(connection)
            .map_err(LeaseStoreError::persistence)?;
            Ok(updated == 1)
        })
        .await
    }

    async fn requeue_paused(
        &self,
        job_id: JobId,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<Option<Job>> {
        self.run_blocking(move |connection| {
            let requeued = diesel::update(
                jobs::table
                    .filter(jobs::id.eq(job_id.into_inner()))
                    .filter(jobs::status.eq(JobStatus::Paused.as_str())),
            )
            .set((
                jobs::status.eq(JobStatus::Queued.as_str()),
                jobs::daemon_id.eq(None::<String>),
                jobs::updated_at.eq(at),
            ))
            .returning(JobRow::as_returning())
            .get_result::<JobRow>(connection)
            .optional()
            .map_err(LeaseStoreError::persistence)?;
            if let Some(row) = requeued {
                return row_to_job(row).map(Some);
            }
            if load_job(connection, job_id)?.is_none() {
                return Err(LeaseStoreError::JobNotFound(job_id));
            }
            Ok(None)
        })
        .await
    }

    async fn force_release_lock(
        &self,
        project_id: ProjectId,
        at: DateTime<Utc>,
    ) -> LeaseStoreResult<ForcedRelease> {
        self.run_blocking(move |connection| {
            connection
                .transaction::<ForcedRelease, TxError, _>(|tx| {
                    let row = projects::table
                        .filter(projects::id.eq(project_id.into_inner()))
                        .select(ProjectRow::as_select())
                        .for_update()
                        .first::<ProjectRow>(tx)
                        .optional()?
                        .ok_or(LeaseStoreError::ProjectNotFound(project_id))?;
                    let Some(holder) = row.current_daemon_id else {
                        return Ok(ForcedRelease::NotLocked);
                    };
                    if let Some(running) = running_job_of(tx, project_id)? {
                        return Ok(ForcedRelease::JobStillRunning(running));
                    }
                    diesel::update(projects::table.filter(projects::id.eq(project_id.into_inner())))
                        .set((
                            projects::current_daemon_id.eq(None::<String>),
                            projects::current_daemon_locked_at.eq(None::<DateTime<Utc>>),
                            projects::updated_at.eq(at),
                        ))
                        .execute(tx)?;
                    let previous = DaemonId::new(holder).map_err(LeaseStoreError::persistence)?;
                    Ok(ForcedRelease::Released(previous))
                })
                .map_err(TxError::into_store)
        })
        .await
    }
}

fn claim_in_transaction(
    tx: &mut PgConnection,
    job_id: JobId,
    daemon_id: &DaemonId,
    at: DateTime<Utc>,
) -> Result<Job, TxError> {
    let job_row = load_job(tx, job_id)?.ok_or(LeaseStoreError::JobNotFound(job_id))?;
    let job = row_to_job(job_row)?;
    let project_id = job.project_id();

    let locked = diesel::sql_query(concat!(
        "UPDATE projects SET current_daemon_id = $1, current_daemon_locked_at = $2, ",
        "updated_at = $2 ",
        "WHERE id = $3 AND status = $4 ",
        "AND (current_daemon_id IS NULL OR current_daemon_id = $1) ",
        "AND NOT EXISTS (SELECT 1 FROM jobs WHERE project_id = $3 AND status = 'running')",
    ))
    .bind::<diesel::sql_types::Text, _>(daemon_id.as_str())
    .bind::<diesel::sql_types::Timestamptz, _>(at)
    .bind::<diesel::sql_types::Uuid, _>(project_id.into_inner())
    .bind::<diesel::sql_types::Text, _>(job.job_type().stage().as_str())
    .execute(tx)?;
    if locked != 1 {
        return Err(TxError::Rejected(diagnose_rejection(tx, &job, daemon_id)?));
    }

    let claimed = diesel::update(
        jobs::table
            .filter(jobs::id.eq(job_id.into_inner()))
            .filter(jobs::status.eq(JobStatus::Queued.as_str()))
            .filter(
                jobs::daemon_id
                    .is_null()
                    .or(jobs::daemon_id.eq(daemon_id.as_str())),
            ),
    )
    .set((
        jobs::status.eq(JobStatus::Running.as_str()),
        jobs::daemon_id.eq(Some(daemon_id.as_str())),
        jobs::updated_at.eq(at),
    ))
    .execute(tx)
    .map_err(|err| match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
            if is_running_job_violation(info.as_ref()) =>
        {
            TxError::Rejected(ClaimRejection::ProjectBusy)
        }
        _ => TxError::from(err),
    })?;
    if claimed != 1 {
        return Err(TxError::Rejected(diagnose_rejection(tx, &job, daemon_id)?));
    }

    let row = load_job(tx, job_id)?.ok_or(LeaseStoreError::JobNotFound(job_id))?;
    Ok(row_to_job(row)?)
}

/// Re-reads the current rows to explain why a conditional claim write missed.
fn diagnose_rejection(
    tx: &mut PgConnection,
    job: &Job,
    daemon_id: &DaemonId,
) -> Result<ClaimRejection, TxError> {
    let project_id = job.project_id();
    let current_job = load_job(tx, job.id())?
        .map(row_to_job)
        .transpose()?
        .ok_or(LeaseStoreError::JobNotFound(job.id()))?;
    let project = load_project(tx, project_id)?
        .map(row_to_project)
        .transpose()?
        .ok_or(LeaseStoreError::ProjectNotFound(project_id))?;
    let has_running_job = running_job_of(tx, project_id)?.is_some();
    Ok(
        evaluate_claim(&project, &current_job, daemon_id, has_running_job)
            .err()
            .unwrap_or(ClaimRejection::ProjectBusy),
    )
}

fn apply_job_plan(tx: &mut PgConnection, change: &JobStatusChange) -> Result<bool, TxError> {
    let job_id = change.job_id.into_inner();
    let daemon = change.daemon_id.as_str();
    let owned = jobs::daemon_id.is_null().or(jobs::daemon_id.eq(daemon));
    let rows = match change.plan {
        ReportPlan::Heartbeat => diesel::update(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::status.eq(JobStatus::Running.as_str()))
                .filter(owned),
        )
        .set(jobs::updated_at.eq(change.at))
        .execute(tx)?,
        ReportPlan::Transition { from, to } => diesel::update(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::status.eq(from.as_str()))
                .filter(owned),
        )
        .set((
            jobs::status.eq(to.as_str()),
            jobs::updated_at.eq(change.at),
        ))
        .execute(tx)?,
        ReportPlan::Unchanged(status) => jobs::table
            .filter(jobs::id.eq(job_id))
            .filter(jobs::status.eq(status.as_str()))
            .filter(owned)
            .count()
            .get_result::<i64>(tx)
            .map(|count| usize::from(count > 0))?,
    };
    if rows == 0 && load_job(tx, change.job_id)?.is_none() {
        return Err(LeaseStoreError::JobNotFound(change.job_id).into());
    }
    Ok(rows == 1)
}

fn release_lock_held_by(
    tx: &mut PgConnection,
    project_id: ProjectId,
    daemon_id: &DaemonId,
    at: DateTime<Utc>,
) -> Result<bool, TxError> {
    let running = jobs::table
        .filter(jobs::project_id.eq(project_id.into_inner()))
        .filter(jobs::status.eq(JobStatus::Running.as_str()));
    let released = diesel::update(
        projects::table
            .filter(projects::id.eq(project_id.into_inner()))
            .filter(projects::current_daemon_id.eq(daemon_id.as_str()))
            .filter(diesel::dsl::not(diesel::dsl::exists(running))),
    )
    .set((
        projects::current_daemon_id.eq(None::<String>),
        projects::current_daemon_locked_at.eq(None::<DateTime<Utc>>),
        projects::updated_at.eq(at),
    ))
    .execute(tx)?;
    Ok(released == 1)
}

fn running_job_of(
    connection: &mut PgConnection,
    project_id: ProjectId,
) -> LeaseStoreResult<Option<JobId>> {
    jobs::table
        .filter(jobs::project_id.eq(project_id.into_inner()))
        .filter(jobs::status.eq(JobStatus::Running.as_str()))
        .select(jobs::id)
        .first::<uuid::Uuid>(connection)
        .optional()
        .map(|id| id.map(JobId::from_uuid))
        .map_err(LeaseStoreError::persistence)
}

fn load_project(
    connection: &mut PgConnection,
    id: ProjectId,
) -> LeaseStoreResult<Option<ProjectRow>> {
    projects::table
        .filter(projects::id.eq(id.into_inner()))
        .select(ProjectRow::as_select())
        .first::<ProjectRow>(connection)
        .optional()
        .map_err(LeaseStoreError::persistence)
}

fn load_job(connection: &mut PgConnection, id: JobId) -> LeaseStoreResult<Option<JobRow>> {
    jobs::table
        .filter(jobs::id.eq(id.into_inner()))
        .select(JobRow::as_select())
        .first::<JobRow>(connection)
        .optional()
        .map_err(LeaseStoreError::persistence)
}

/// SQL predicate matching each job type to the stage that runs it.
fn stage_pairing_predicate() -> String {
    JobType::ALL
        .iter()
        .map(|job_type| {
            format!(
                "(p.status = '{}' AND j.job_type = '{}')",
                job_type.stage().as_str(),
                job_type.as_str(),
            )
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn is_running_job_violation(info: &dyn DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == RUNNING_JOB_INDEX)
}

fn to_new_project_row(project: &Project) -> NewProjectRow {
    NewProjectRow {
        id: project.id().into_inner(),
        status: project.stage().as_str().to_owned(),
        current_daemon_id: project.lock().map(|lock| lock.daemon_id().as_str().to_owned()),
        current_daemon_locked_at: project.lock().map(ProjectLock::locked_at),
        created_at: project.created_at(),
        updated_at: project.updated_at(),
    }
}

fn to_new_job_row(job: &Job) -> NewJobRow {
    NewJobRow {
        id: job.id().into_inner(),
        project_id: job.project_id().into_inner(),
        job_type: job.job_type().as_str().to_owned(),
        status: job.status().as_str().to_owned(),
        daemon_id: job.daemon_id().map(|daemon| daemon.as_str().to_owned()),
        payload: job.payload().clone(),
        failure_reason: job.failure_reason().map(str::to_owned),
        created_at: job.created_at(),
        updated_at: job.updated_at(),
    }
}

fn row_to_project(row: ProjectRow) -> LeaseStoreResult<Project> {
    let ProjectRow {
        id,
        status: persisted_stage,
        current_daemon_id,
        current_daemon_locked_at,
        created_at,
        updated_at,
    } = row;

    let stage =
        ProjectStage::try_from(persisted_stage.as_str()).map_err(LeaseStoreError::persistence)?;
    let lock = current_daemon_id
        .map(|holder| {
            DaemonId::new(holder).map(|daemon_id| {
                ProjectLock::new(daemon_id, current_daemon_locked_at.unwrap_or(updated_at))
            })
        })
        .transpose()
        .map_err(LeaseStoreError::persistence)?;

    Ok(Project::from_persisted(PersistedProjectData {
        id: ProjectId::from_uuid(id),
        stage,
        lock,
        created_at,
        updated_at,
    }))
}

fn row_to_job(row: JobRow) -> LeaseStoreResult<Job> {
    let JobRow {
        id,
        project_id,
        job_type: persisted_type,
        status: persisted_status,
        daemon_id: persisted_daemon,
        payload,
        failure_reason,
        created_at,
        updated_at,
    } = row;

    let job_type =
        JobType::try_from(persisted_type.as_str()).map_err(LeaseStoreError::persistence)?;
    let status =
        JobStatus::try_from(persisted_status.as_str()).map_err(LeaseStoreError::persistence)?;
    let daemon_id = persisted_daemon
        .map(DaemonId::new)
        .transpose()
        .map_err(LeaseStoreError::persistence)?;

    Ok(Job::from_persisted(PersistedJobData {
        id: JobId::from_uuid(id),
        project_id: ProjectId::from_uuid(project_id),
        job_type,
        status,
        daemon_id,
        payload,
        failure_reason,
        created_at,
        updated_at,
    }))
}
