//! The job store contract.

use async_trait::async_trait;
use docconv_core::status::JobStatus;
use docconv_core::types::{JobId, Timestamp};

use crate::models::job::{Job, JobUpdate, NewJob};

/// Errors surfaced by any [`JobStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(JobId),

    #[error("Job {0} already exists")]
    Duplicate(JobId),

    /// The job has already left `pending`; status never moves backward.
    #[error("Job {id} is already {status}")]
    AlreadyTerminal { id: JobId, status: JobStatus },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable record of conversion jobs, keyed by job id.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `pending` job.
    async fn create(&self, input: &NewJob) -> Result<Job, StoreError>;

    /// Apply a terminal transition. Only a `pending` job can be updated.
    async fn update(&self, update: &JobUpdate) -> Result<(), StoreError>;

    async fn get(&self, id: JobId) -> Result<Job, StoreError>;

    /// The `limit` most recently created jobs, newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>, StoreError>;

    /// Every job created strictly before `cutoff`, oldest first.
    async fn list_older_than(&self, cutoff: Timestamp) -> Result<Vec<Job>, StoreError>;

    async fn delete(&self, id: JobId) -> Result<(), StoreError>;
}
