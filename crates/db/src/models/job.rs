//! Conversion job entity and transition DTOs.

use docconv_core::converter::GENERIC_FAILURE;
use docconv_core::status::JobStatus;
use docconv_core::types::{self, JobId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `conversion_jobs` table.
///
/// Also the snapshot carried by `job_update` events and returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub original_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_file: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// The record a freshly created job starts as.
    pub fn pending(input: &NewJob) -> Self {
        Self {
            id: input.id,
            original_file: input.original_file.clone(),
            converted_file: None,
            status: JobStatus::Pending,
            error: None,
            created_at: input.created_at,
            updated_at: input.created_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a transition to this record (used by the in-memory store).
    pub fn apply(&mut self, update: &JobUpdate) {
        self.status = update.status;
        self.error = update.error.clone();
        self.converted_file = update.converted_file.clone();
        self.updated_at = update.updated_at;
    }
}

/// DTO for creating a job when an upload is accepted.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: JobId,
    pub original_file: String,
    pub created_at: Timestamp,
}

impl NewJob {
    /// A job with a fresh identifier, created now.
    pub fn new(original_file: impl Into<String>) -> Self {
        Self {
            id: types::new_job_id(),
            original_file: original_file.into(),
            created_at: types::now(),
        }
    }
}

/// A terminal transition of a pending job.
///
/// Only constructible through [`JobUpdate::complete`] and
/// [`JobUpdate::failed`], so a `complete` update always names an artifact
/// and a `failed` update always carries a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    id: JobId,
    status: JobStatus,
    error: Option<String>,
    converted_file: Option<String>,
    updated_at: Timestamp,
}

impl JobUpdate {
    pub fn complete(id: JobId, converted_file: impl Into<String>, updated_at: Timestamp) -> Self {
        Self {
            id,
            status: JobStatus::Complete,
            error: None,
            converted_file: Some(converted_file.into()),
            updated_at,
        }
    }

    /// An empty diagnostic is replaced by the generic failure text.
    pub fn failed(id: JobId, diagnostic: impl Into<String>, updated_at: Timestamp) -> Self {
        let diagnostic = diagnostic.into();
        let diagnostic = if diagnostic.trim().is_empty() {
            GENERIC_FAILURE.to_string()
        } else {
            diagnostic
        };
        Self {
            id,
            status: JobStatus::Failed,
            error: Some(diagnostic),
            converted_file: None,
            updated_at,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn converted_file(&self) -> Option<&str> {
        self.converted_file.as_deref()
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }
}
