//! Job event wire format.
//!
//! ```text
//! {"type":"job_update","payload":{ ...full job snapshot... }}
//! {"type":"job_delete","job_id":"<uuid>"}
//! ```

use axum::extract::ws::Message;
use docconv_core::types::JobId;
use docconv_db::models::job::Job;
use serde::{Deserialize, Serialize};

/// A lifecycle event delivered to every registered observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was created or transitioned; carries the committed snapshot.
    JobUpdate { payload: Job },
    /// A job and its artifacts were removed.
    JobDelete { job_id: JobId },
}

impl JobEvent {
    pub fn updated(job: Job) -> Self {
        JobEvent::JobUpdate { payload: job }
    }

    pub fn deleted(job_id: JobId) -> Self {
        JobEvent::JobDelete { job_id }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobUpdate { payload } => payload.id,
            JobEvent::JobDelete { job_id } => *job_id,
        }
    }

    /// Serialize into a WebSocket text frame.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(Message::Text(json.into()))
    }
}
