//! In-process [`JobStore`].
//!
//! Same contract as the PostgreSQL store, without durability across
//! restarts. Used when no database is configured and by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use docconv_core::types::{JobId, Timestamp};
use tokio::sync::RwLock;

use crate::models::job::{Job, JobUpdate, NewJob};
use crate::store::{JobStore, StoreError};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, input: &NewJob) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&input.id) {
            return Err(StoreError::Duplicate(input.id));
        }
        let job = Job::pending(input);
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn update(&self, update: &JobUpdate) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&update.id())
            .ok_or(StoreError::NotFound(update.id()))?;
        if !job.status.can_transition_to(update.status()) {
            return Err(StoreError::AlreadyTerminal {
                id: job.id,
                status: job.status,
            });
        }
        job.apply(update);
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }

    async fn list_older_than(&self, cutoff: Timestamp) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.created_at < cutoff)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn delete(&self, id: JobId) -> Result<(), StoreError> {
        self.jobs
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}
