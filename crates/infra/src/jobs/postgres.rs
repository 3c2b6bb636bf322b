//! Postgres-backed job store.
//!
//! Schema lives in `migrations/0001_jobs.sql` and can be applied with
//! [`PostgresJobStore::migrate`].
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | JobStoreError | Scenario |
//! |------------|-----------------|---------------|----------|
//! | Database (unique violation) on `jobs` | `23505` | `AlreadyExists` | Duplicate job id |
//! | Database (unique violation) on `job_attempts` | `23505` | `AttemptOutOfOrder` | Concurrent append of the same attempt number |
//! | Database (foreign key violation) | `23503` | `NotFound` | Attempt for an unknown job |
//! | Anything else | Any | `Storage` | Network errors, pool closed, bad rows |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use jobforge_core::{AttemptRecord, Job, JobId, JobStatus, JobType};

use super::store::{JobStore, JobStoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_jobs.sql");

const JOB_COLUMNS: &str = "id, job_type, payload, status, attempt_count, max_attempts, \
                           created_at, started_at, completed_at, last_error";

const ATTEMPT_COLUMNS: &str =
    "job_id, attempt_number, started_at, finished_at, succeeded, error, duration_ms";

/// Job store backed by the `jobs` and `job_attempts` tables.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` with a default pool.
    pub async fn connect(database_url: &str) -> Result<Self, JobStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), JobStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn create(&self, job: &Job) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, attempt_count, max_attempts,
                              created_at, started_at, completed_at, last_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.job_type.as_str())
        .bind(&job.payload)
        .bind(job.status.as_str())
        .bind(i64::from(job.attempt_count))
        .bind(i64::from(job.max_attempts))
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_error.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("create", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status), err)]
    async fn save(&self, job: &Job) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, attempt_count = $3, started_at = $4, completed_at = $5, last_error = $6
            WHERE id = $1
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.status.as_str())
        .bind(i64::from(job.attempt_count))
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.last_error.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save", e))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job.id));
        }
        Ok(())
    }

    #[instrument(skip(self, record), fields(job_id = %record.job_id, attempt = record.attempt_number), err)]
    async fn append_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("append_attempt", e))?;

        let last: i64 = sqlx::query(
            "SELECT COALESCE(MAX(attempt_number), 0) AS last FROM job_attempts WHERE job_id = $1",
        )
        .bind(record.job_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("last"))
        .map_err(|e| map_sqlx_error("append_attempt", e))?;

        let expected = u32::try_from(last + 1).map_err(|_| {
            JobStoreError::storage(format!("attempt number out of range for job {}", record.job_id))
        })?;
        let out_of_order = JobStoreError::AttemptOutOfOrder {
            job_id: record.job_id,
            expected,
            found: record.attempt_number,
        };
        if record.attempt_number != expected {
            return Err(out_of_order);
        }

        sqlx::query(
            r#"
            INSERT INTO job_attempts (job_id, attempt_number, started_at, finished_at,
                                      succeeded, error, duration_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.job_id.as_uuid())
        .bind(i64::from(record.attempt_number))
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(record.succeeded)
        .bind(record.error.as_deref())
        .bind(record.duration_ms.map(|d| d as i64))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                out_of_order
            } else if is_foreign_key_violation(&e) {
                JobStoreError::NotFound(record.job_id)
            } else {
                map_sqlx_error("append_attempt", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("append_attempt", e))?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(job_id = %record.job_id, attempt = record.attempt_number), err)]
    async fn update_attempt(&self, record: &AttemptRecord) -> Result<(), JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE job_attempts
            SET finished_at = $3, succeeded = $4, error = $5, duration_ms = $6
            WHERE job_id = $1 AND attempt_number = $2
            "#,
        )
        .bind(record.job_id.as_uuid())
        .bind(i64::from(record.attempt_number))
        .bind(record.finished_at)
        .bind(record.succeeded)
        .bind(record.error.as_deref())
        .bind(record.duration_ms.map(|d| d as i64))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_attempt", e))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::AttemptNotFound {
                job_id: record.job_id,
                attempt: record.attempt_number,
            });
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_recent(&self, take: usize) -> Result<Vec<Job>, JobStoreError> {
        let limit = i64::try_from(take).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_recent", e))?;

        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn list_attempts(&self, job_id: JobId) -> Result<Vec<AttemptRecord>, JobStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM job_attempts WHERE job_id = $1 ORDER BY attempt_number ASC"
        ))
        .bind(job_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_attempts", e))?;

        rows.iter().map(attempt_from_row).collect()
    }
}

fn job_from_row(row: &sqlx::postgres::PgRow) -> Result<Job, JobStoreError> {
    let decode = |e: sqlx::Error| JobStoreError::storage(format!("failed to decode job row: {e}"));

    let job_type: String = row.try_get("job_type").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let attempt_count: i64 = row.try_get("attempt_count").map_err(decode)?;
    let max_attempts: i64 = row.try_get("max_attempts").map_err(decode)?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(decode)?),
        job_type: job_type
            .parse::<JobType>()
            .map_err(|e| JobStoreError::storage(e.to_string()))?,
        payload: row.try_get("payload").map_err(decode)?,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| JobStoreError::storage(e.to_string()))?,
        attempt_count: to_u32("attempt_count", attempt_count)?,
        max_attempts: to_u32("max_attempts", max_attempts)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode)?,
        started_at: row.try_get("started_at").map_err(decode)?,
        completed_at: row.try_get("completed_at").map_err(decode)?,
        last_error: row.try_get("last_error").map_err(decode)?,
    })
}

fn attempt_from_row(row: &sqlx::postgres::PgRow) -> Result<AttemptRecord, JobStoreError> {
    let decode =
        |e: sqlx::Error| JobStoreError::storage(format!("failed to decode attempt row: {e}"));

    let attempt_number: i64 = row.try_get("attempt_number").map_err(decode)?;
    let duration_ms: Option<i64> = row.try_get("duration_ms").map_err(decode)?;

    Ok(AttemptRecord {
        job_id: JobId::from_uuid(row.try_get("job_id").map_err(decode)?),
        attempt_number: to_u32("attempt_number", attempt_number)?,
        started_at: row.try_get("started_at").map_err(decode)?,
        finished_at: row.try_get("finished_at").map_err(decode)?,
        succeeded: row.try_get("succeeded").map_err(decode)?,
        error: row.try_get("error").map_err(decode)?,
        duration_ms: duration_ms.map(|d| d.max(0) as u64),
    })
}

fn to_u32(column: &str, value: i64) -> Result<u32, JobStoreError> {
    u32::try_from(value)
        .map_err(|_| JobStoreError::storage(format!("{column} out of range: {value}")))
}

fn db_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    db_code(err).as_deref() == Some("23505")
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    db_code(err).as_deref() == Some("23503")
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => JobStoreError::storage(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            JobStoreError::storage(format!("connection pool closed in {operation}"))
        }
        other => JobStoreError::storage(format!("sqlx error in {operation}: {other}")),
    }
}
