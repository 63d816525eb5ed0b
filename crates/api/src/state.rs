use std::sync::Arc;

use docconv_core::converter::DocumentConverter;
use docconv_core::storage::JobStorage;
use docconv_db::JobStore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::engine::JobLifecycle;
use crate::ws::ObserverRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Job store (PostgreSQL or in-memory).
    pub store: Arc<dyn JobStore>,
    pub config: Arc<ServerConfig>,
    /// Live observers of job events.
    pub registry: Arc<ObserverRegistry>,
    /// Conversion pipeline shared by all runs.
    pub lifecycle: Arc<JobLifecycle>,
    /// Per-job working directories.
    pub storage: JobStorage,
    /// Tracks in-flight lifecycle runs so shutdown can wait for them.
    pub tasks: TaskTracker,
    /// Cancelled when shutdown begins; new uploads are refused after that.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the shared services around a store and a converter.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn JobStore>,
        converter: Arc<dyn DocumentConverter>,
    ) -> Self {
        let registry = Arc::new(ObserverRegistry::new());
        let storage = JobStorage::new(config.conversion.temp_dir.clone());
        let lifecycle = Arc::new(JobLifecycle::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            converter,
            storage.clone(),
        ));

        Self {
            store,
            config: Arc::new(config),
            registry,
            lifecycle,
            storage,
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }
}
