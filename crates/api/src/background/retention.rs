//! Periodic cleanup of expired conversion jobs.
//!
//! Every interval, jobs created more than the retention period ago are
//! removed: first their working directory, then their store record. Status
//! is not considered, so a job stuck in `pending` is reclaimed as well.

use std::sync::Arc;
use std::time::Duration;

use docconv_core::storage::JobStorage;
use docconv_core::types::{self, Timestamp};
use docconv_db::models::job::Job;
use docconv_db::JobStore;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ws::{JobEvent, ObserverRegistry};

/// Result of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs whose directory and record were both removed.
    pub removed: usize,
    /// Jobs left for the next sweep after an error.
    pub skipped: usize,
}

pub struct RetentionSweeper {
    store: Arc<dyn JobStore>,
    registry: Arc<ObserverRegistry>,
    storage: JobStorage,
    interval: Duration,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ObserverRegistry>,
        storage: JobStorage,
        interval: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            storage,
            interval,
            retention,
        }
    }

    /// Run the sweep loop until `cancel` is triggered.
    ///
    /// The first sweep happens one full interval after start.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "Retention sweeper started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Retention sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.sweep(&cancel).await;
                    if report.removed > 0 || report.skipped > 0 {
                        tracing::info!(
                            removed = report.removed,
                            skipped = report.skipped,
                            "Retention sweep finished"
                        );
                    } else {
                        tracing::debug!("Retention sweep: nothing to remove");
                    }
                }
            }
        }
    }

    /// Remove every job older than the retention period.
    pub async fn sweep(&self, cancel: &CancellationToken) -> SweepReport {
        let Some(cutoff) = self.cutoff() else {
            return SweepReport::default();
        };
        self.sweep_before(cutoff, cancel).await
    }

    /// Remove every job created strictly before `cutoff`.
    ///
    /// Cancellation is checked before each job; a job whose cleanup has
    /// started is always finished.
    pub async fn sweep_before(&self, cutoff: Timestamp, cancel: &CancellationToken) -> SweepReport {
        let mut report = SweepReport::default();

        let jobs = match self.store.list_older_than(cutoff).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Retention sweep: failed to list expired jobs");
                return report;
            }
        };

        for job in jobs {
            if cancel.is_cancelled() {
                tracing::info!("Retention sweep interrupted by shutdown");
                break;
            }
            if self.remove(&job).await {
                report.removed += 1;
            } else {
                report.skipped += 1;
            }
        }
        report
    }

    /// Directory first, then record. Returns `false` if the job was left.
    async fn remove(&self, job: &Job) -> bool {
        let paths = self.storage.job(job.id);
        if let Err(e) = paths.remove().await {
            tracing::error!(
                job_id = %job.id,
                path = %paths.job_dir.display(),
                error = %e,
                "Failed to remove job directory"
            );
            return false;
        }

        if let Err(e) = self.store.delete(job.id).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to delete expired job");
            return false;
        }

        tracing::info!(job_id = %job.id, created_at = %job.created_at, "Cleaned up expired job");
        self.registry.broadcast(&JobEvent::deleted(job.id)).await;
        true
    }

    fn cutoff(&self) -> Option<Timestamp> {
        let retention = chrono::Duration::from_std(self.retention).ok()?;
        types::now().checked_sub_signed(retention)
    }
}
