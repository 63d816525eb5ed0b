//! Tests for the retention sweeper.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Duration as TimeDelta;
use common::{drain_events, observe};
use docconv_api::background::{RetentionSweeper, SweepReport};
use docconv_api::ws::{JobEvent, ObserverRegistry};
use docconv_core::storage::JobStorage;
use docconv_core::types::{self, JobId, Timestamp};
use docconv_db::models::job::{Job, JobUpdate, NewJob};
use docconv_db::{JobStore, MemoryJobStore, StoreError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Harness {
    store: Arc<dyn JobStore>,
    registry: Arc<ObserverRegistry>,
    storage: JobStorage,
    _temp: TempDir,
}

fn harness_with(store: Arc<dyn JobStore>) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    Harness {
        store,
        registry: Arc::new(ObserverRegistry::new()),
        storage: JobStorage::new(temp.path().join("jobs")),
        _temp: temp,
    }
}

fn harness() -> Harness {
    harness_with(Arc::new(MemoryJobStore::new()))
}

impl Harness {
    fn sweeper(&self, interval: Duration, retention: Duration) -> RetentionSweeper {
        RetentionSweeper::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.storage.clone(),
            interval,
            retention,
        )
    }

    /// A job created at `created_at` with its working directory on disk.
    async fn seed(&self, name: &str, created_at: Timestamp) -> Job {
        let input = NewJob {
            id: types::new_job_id(),
            original_file: name.to_string(),
            created_at,
        };
        let job = self.store.create(&input).await.unwrap();
        let paths = self.storage.job(job.id);
        paths.create().await.unwrap();
        tokio::fs::write(paths.original_file(name), b"content")
            .await
            .unwrap();
        job
    }

    fn dir_exists(&self, id: JobId) -> bool {
        self.storage.job(id).job_dir.exists()
    }
}

// ---------------------------------------------------------------------------
// Test: only jobs strictly older than the cutoff are removed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_removes_exactly_the_expired_jobs() {
    let h = harness();
    let cutoff = types::now();
    let old = h.seed("old.docx", cutoff - TimeDelta::hours(25)).await;
    let edge = h.seed("edge.docx", cutoff).await;
    let fresh = h.seed("fresh.docx", cutoff + TimeDelta::seconds(1)).await;

    let report = h
        .sweeper(Duration::from_secs(3600), Duration::from_secs(86_400))
        .sweep_before(cutoff, &CancellationToken::new())
        .await;

    assert_eq!(report, SweepReport { removed: 1, skipped: 0 });
    assert_matches!(h.store.get(old.id).await, Err(StoreError::NotFound(_)));
    assert!(!h.dir_exists(old.id));

    for kept in [&edge, &fresh] {
        assert!(h.store.get(kept.id).await.is_ok());
        assert!(h.dir_exists(kept.id));
    }
}

// ---------------------------------------------------------------------------
// Test: status does not matter, a stuck pending job is reclaimed too
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_ignores_status() {
    let h = harness();
    let long_ago = types::now() - TimeDelta::days(3);
    let pending = h.seed("stuck.docx", long_ago).await;
    let failed = h.seed("failed.odt", long_ago).await;
    h.store
        .update(&JobUpdate::failed(
            failed.id,
            "Conversion failed",
            types::next_timestamp(failed.updated_at),
        ))
        .await
        .unwrap();

    let report = h
        .sweeper(Duration::from_secs(3600), Duration::from_secs(86_400))
        .sweep(&CancellationToken::new())
        .await;

    assert_eq!(report.removed, 2);
    assert!(h.store.list_recent(100).await.unwrap().is_empty());
    assert!(!h.dir_exists(pending.id));
}

// ---------------------------------------------------------------------------
// Test: each removed job is announced to observers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_broadcasts_job_delete() {
    let h = harness();
    let (_id, mut rx) = observe(&h.registry).await;
    let old = h.seed("old.docx", types::now() - TimeDelta::days(2)).await;

    h.sweeper(Duration::from_secs(3600), Duration::from_secs(86_400))
        .sweep(&CancellationToken::new())
        .await;

    assert_eq!(drain_events(&mut rx), vec![JobEvent::deleted(old.id)]);
}

// ---------------------------------------------------------------------------
// Test: a job whose directory never existed is still removed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_directory_is_not_an_error() {
    let h = harness();
    let input = NewJob {
        id: types::new_job_id(),
        original_file: "ghost.docx".into(),
        created_at: types::now() - TimeDelta::days(2),
    };
    h.store.create(&input).await.unwrap();

    let report = h
        .sweeper(Duration::from_secs(3600), Duration::from_secs(86_400))
        .sweep(&CancellationToken::new())
        .await;

    assert_eq!(report, SweepReport { removed: 1, skipped: 0 });
}

// ---------------------------------------------------------------------------
// Test: no new cleanup starts once cancellation is requested
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_sweep_leaves_everything() {
    let h = harness();
    let old = h.seed("old.docx", types::now() - TimeDelta::days(2)).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = h
        .sweeper(Duration::from_secs(3600), Duration::from_secs(86_400))
        .sweep(&cancel)
        .await;

    assert_eq!(report, SweepReport::default());
    assert!(h.store.get(old.id).await.is_ok());
    assert!(h.dir_exists(old.id));
}

// ---------------------------------------------------------------------------
// Test: a directory that cannot be removed keeps the record
// ---------------------------------------------------------------------------

#[tokio::test]
async fn directory_failure_skips_job_and_keeps_record() {
    let temp = tempfile::tempdir().unwrap();
    // Job trees resolve beneath a regular file, so removal fails with
    // "not a directory" rather than "not found".
    let root = temp.path().join("not-a-directory");
    std::fs::write(&root, b"occupied").unwrap();
    let h = Harness {
        store: Arc::new(MemoryJobStore::new()),
        registry: Arc::new(ObserverRegistry::new()),
        storage: JobStorage::new(&root),
        _temp: temp,
    };
    let (_id, mut rx) = observe(&h.registry).await;
    let input = NewJob {
        id: types::new_job_id(),
        original_file: "stuck.docx".into(),
        created_at: types::now() - TimeDelta::days(2),
    };
    let job = h.store.create(&input).await.unwrap();

    let report = h
        .sweeper(Duration::from_secs(3600), Duration::from_secs(86_400))
        .sweep(&CancellationToken::new())
        .await;

    assert_eq!(report, SweepReport { removed: 0, skipped: 1 });
    assert!(h.store.get(job.id).await.is_ok());
    assert!(drain_events(&mut rx).is_empty());
}

/// Store whose deletes always fail.
struct UndeletableStore(MemoryJobStore);

#[async_trait]
impl JobStore for UndeletableStore {
    async fn create(&self, input: &NewJob) -> Result<Job, StoreError> {
        self.0.create(input).await
    }

    async fn update(&self, update: &JobUpdate) -> Result<(), StoreError> {
        self.0.update(update).await
    }

    async fn get(&self, id: JobId) -> Result<Job, StoreError> {
        self.0.get(id).await
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Job>, StoreError> {
        self.0.list_recent(limit).await
    }

    async fn list_older_than(&self, cutoff: Timestamp) -> Result<Vec<Job>, StoreError> {
        self.0.list_older_than(cutoff).await
    }

    async fn delete(&self, _id: JobId) -> Result<(), StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
}

// ---------------------------------------------------------------------------
// Test: a record that cannot be deleted is skipped and retried next sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_failure_skips_job_without_broadcast() {
    let h = harness_with(Arc::new(UndeletableStore(MemoryJobStore::new())));
    let (_id, mut rx) = observe(&h.registry).await;
    let first = h.seed("a.docx", types::now() - TimeDelta::days(2)).await;
    let second = h.seed("b.docx", types::now() - TimeDelta::days(2)).await;

    let sweeper = h.sweeper(Duration::from_secs(3600), Duration::from_secs(86_400));
    let report = sweeper.sweep(&CancellationToken::new()).await;

    assert_eq!(report, SweepReport { removed: 0, skipped: 2 });
    assert!(h.store.get(first.id).await.is_ok());
    assert!(h.store.get(second.id).await.is_ok());
    assert!(drain_events(&mut rx).is_empty());

    // Still eligible on the next sweep.
    let again = sweeper.sweep(&CancellationToken::new()).await;
    assert_eq!(again.skipped, 2);
}

// ---------------------------------------------------------------------------
// Test: run() sweeps on its interval and stops on cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_sweeps_periodically_until_cancelled() {
    let h = harness();
    let old = h.seed("old.docx", types::now() - TimeDelta::days(2)).await;

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        h.sweeper(Duration::from_millis(50), Duration::from_secs(86_400))
            .run(cancel.clone()),
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.store.get(old.id).await.is_ok() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("expired job was never swept");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("sweeper did not stop")
        .unwrap();
}

// ---------------------------------------------------------------------------
// Test: the first sweep waits a full interval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_does_not_sweep_immediately() {
    let h = harness();
    let old = h.seed("old.docx", types::now() - TimeDelta::days(2)).await;

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(
        h.sweeper(Duration::from_secs(3600), Duration::from_secs(86_400))
            .run(cancel.clone()),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.store.get(old.id).await.is_ok());

    cancel.cancel();
    handle.await.unwrap();
}
