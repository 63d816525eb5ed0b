use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use docconv_core::converter::{ConversionOutcome, DocumentConverter};
use docconv_core::storage::JobStorage;
use docconv_core::types::{self, next_timestamp, JobId};
use docconv_db::models::job::{Job, JobUpdate};
use docconv_db::JobStore;
use tokio::io::AsyncRead;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::ws::{JobEvent, ObserverRegistry};

/// Why a conversion run ended in `failed`.
///
/// The `Display` text is stored as the job's diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Failed to create working directory: {0}")]
    Workspace(#[source] io::Error),

    #[error("Failed to save uploaded file: {0}")]
    SaveUpload(#[source] io::Error),

    /// Diagnostic reported by the converter.
    #[error("{0}")]
    Converter(String),

    #[error("Converted file not found after conversion")]
    MissingArtifact(PathBuf),

    #[error("Failed to set output permissions: {0}")]
    Permissions(#[source] io::Error),
}

/// Runs conversion jobs.
///
/// One instance is shared by every run; runs hold no state in common beyond
/// the store and the observer registry.
pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
    registry: Arc<ObserverRegistry>,
    converter: Arc<dyn DocumentConverter>,
    storage: JobStorage,
}

impl JobLifecycle {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ObserverRegistry>,
        converter: Arc<dyn DocumentConverter>,
        storage: JobStorage,
    ) -> Self {
        Self {
            store,
            registry,
            converter,
            storage,
        }
    }

    /// Start a detached run on `tasks`.
    ///
    /// The caller guarantees at most one run per job.
    pub fn spawn<R>(self: &Arc<Self>, tasks: &TaskTracker, job_id: JobId, input: R, filename: String)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let lifecycle = Arc::clone(self);
        tasks.spawn(async move {
            lifecycle.run(job_id, input, &filename).await;
        });
    }

    /// Run the full pipeline for a pending job.
    ///
    /// Never returns an error: every failure becomes a terminal `failed`
    /// transition carrying a diagnostic.
    pub async fn run<R>(&self, job_id: JobId, mut input: R, original_filename: &str)
    where
        R: AsyncRead + Unpin + Send,
    {
        let span = tracing::info_span!("conversion", job_id = %job_id);
        async move {
            tracing::info!(filename = original_filename, "Starting conversion");

            let previous = self
                .publish_current(job_id)
                .await
                .map(|job| job.updated_at)
                .unwrap_or_else(types::now);

            let update = match self.convert(job_id, &mut input, original_filename).await {
                Ok(artifact) => {
                    tracing::info!(path = %artifact.display(), "Conversion completed");
                    JobUpdate::complete(
                        job_id,
                        artifact.to_string_lossy(),
                        next_timestamp(previous),
                    )
                }
                Err(e) => {
                    if let ConversionError::MissingArtifact(path) = &e {
                        tracing::error!(expected = %path.display(), "Converted file not found");
                    } else {
                        tracing::error!(error = %e, "Conversion failed");
                    }
                    JobUpdate::failed(job_id, e.to_string(), next_timestamp(previous))
                }
            };

            self.finish(update).await;
        }
        .instrument(span)
        .await
    }

    /// Steps that may fail the job. Returns the artifact path on success.
    async fn convert<R>(
        &self,
        job_id: JobId,
        input: &mut R,
        filename: &str,
    ) -> Result<PathBuf, ConversionError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let paths = self.storage.job(job_id);
        paths.create().await.map_err(ConversionError::Workspace)?;

        let original = paths
            .save_original(filename, input)
            .await
            .map_err(ConversionError::SaveUpload)?;
        tracing::debug!(path = %original.display(), "Saved uploaded file");

        match self.converter.convert(&original, &paths.converted_dir).await {
            ConversionOutcome::Success { output } => {
                tracing::debug!(output = %output, "Converter finished");
            }
            ConversionOutcome::Failure { diagnostic, output } => {
                tracing::warn!(output = %output, "Converter reported failure");
                return Err(ConversionError::Converter(diagnostic));
            }
        }

        let artifact = paths.expected_artifact(filename);
        match tokio::fs::metadata(&artifact).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(ConversionError::MissingArtifact(artifact)),
        }

        paths
            .normalize_permissions(&artifact)
            .await
            .map_err(ConversionError::Permissions)?;

        Ok(artifact)
    }

    /// Persist a terminal transition, then broadcast the committed record.
    async fn finish(&self, update: JobUpdate) {
        if let Err(e) = self.store.update(&update).await {
            tracing::error!(status = %update.status(), error = %e, "Failed to persist job transition");
            return;
        }
        self.publish_current(update.id()).await;
    }

    /// Broadcast the job as currently stored.
    async fn publish_current(&self, job_id: JobId) -> Option<Job> {
        match self.store.get(job_id).await {
            Ok(job) => {
                self.registry.broadcast(&JobEvent::updated(job.clone())).await;
                Some(job)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load job for broadcast");
                None
            }
        }
    }
}
