//! Repository for the `conversion_jobs` table.
//!
//! Status is stored as its lowercase name; the `pending` guard on updates
//! keeps transitions monotonic even if two writers race.

use async_trait::async_trait;
use docconv_core::status::JobStatus;
use docconv_core::types::{JobId, Timestamp};
use sqlx::PgPool;

use crate::models::job::{Job, JobUpdate, NewJob};
use crate::store::{JobStore, StoreError};

/// Column list for `conversion_jobs` queries.
const COLUMNS: &str = "\
    id, original_file, converted_file, status, error, created_at, updated_at";

/// PostgreSQL unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Provides CRUD operations for conversion jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new pending job. `updated_at` starts equal to `created_at`.
    pub async fn create(pool: &PgPool, input: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO conversion_jobs (id, original_file, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.id)
            .bind(&input.original_file)
            .bind(JobStatus::Pending.as_str())
            .bind(input.created_at)
            .fetch_one(pool)
            .await
    }

    /// Apply a terminal transition if the job is still pending.
    ///
    /// Returns `true` if a row was updated.
    pub async fn transition(pool: &PgPool, update: &JobUpdate) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE conversion_jobs \
             SET status = $2, error = $3, converted_file = $4, updated_at = $5 \
             WHERE id = $1 AND status = $6",
        )
        .bind(update.id())
        .bind(update.status().as_str())
        .bind(update.error())
        .bind(update.converted_file())
        .bind(update.updated_at())
        .bind(JobStatus::Pending.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM conversion_jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The most recently created jobs, newest first.
    pub async fn list_recent(pool: &PgPool, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM conversion_jobs \
             ORDER BY created_at DESC \
             LIMIT $1"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Jobs created strictly before `cutoff`, regardless of status.
    pub async fn list_created_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM conversion_jobs \
             WHERE created_at < $1 \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    /// Hard-delete a job. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: JobId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM conversion_jobs WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// JobStore implementation
// ---------------------------------------------------------------------------

/// [`JobStore`] backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, input: &NewJob) -> Result<Job, StoreError> {
        match JobRepo::create(&self.pool, input).await {
            Ok(job) => Ok(job),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(StoreError::Duplicate(input.id))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn update(&self, update: &JobUpdate) -> Result<(), StoreError> {
        if JobRepo::transition(&self.pool, update).await? {
            return Ok(());
        }
        // Nothing updated: either the job is gone or it already left pending.
        match JobRepo::find_by_id(&self.pool, update.id()).await? {
            None => Err(StoreError::NotFound(update.id())),
            Some(job) => Err(StoreError::AlreadyTerminal {
                id: job.id,
                status: job.status,
            }),
        }
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        JobRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>, StoreError> {
        Ok(JobRepo::list_recent(&self.pool, limit).await?)
    }

    async fn list_older_than(&self, cutoff: Timestamp) -> Result<Vec<Job>, StoreError> {
        Ok(JobRepo::list_created_before(&self.pool, cutoff).await?)
    }

    async fn delete(&self, id: JobId) -> Result<(), StoreError> {
        if JobRepo::delete(&self.pool, id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(id))
        }
    }
}
