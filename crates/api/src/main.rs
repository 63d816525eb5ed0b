use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use docconv_api::background::RetentionSweeper;
use docconv_api::config::{LogFormat, ServerConfig};
use docconv_api::router::build_app_router;
use docconv_api::state::AppState;
use docconv_api::ws;
use docconv_core::converter::LibreOfficeConverter;
use docconv_db::{JobStore, MemoryJobStore, PgJobStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid configuration")?;

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Job store ---
    let store = connect_store(&config).await?;

    // --- App state ---
    let converter = LibreOfficeConverter::new(
        config.conversion.converter_bin.clone(),
        config.conversion.converter_timeout(),
    );
    let state = AppState::new(config.clone(), store, Arc::new(converter));
    state.storage.ensure_root().await.with_context(|| {
        format!("Failed to create temp directory {}", state.storage.root().display())
    })?;
    tracing::info!(path = %state.storage.root().display(), "Using temp directory");

    // --- Heartbeat ---
    let heartbeat_handle =
        ws::start_heartbeat(Arc::clone(&state.registry), config.heartbeat_interval());

    // --- Retention sweeper ---
    let sweeper = RetentionSweeper::new(
        Arc::clone(&state.store),
        Arc::clone(&state.registry),
        state.storage.clone(),
        config.conversion.cleanup_interval(),
        config.conversion.retention_period(),
    );
    let sweeper_handle = tokio::spawn(sweeper.run(state.shutdown.clone()));

    // --- Router ---
    let app = build_app_router(state.clone(), &config);

    // --- Start server ---
    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let _ = sweeper_handle.await;
    tracing::info!("Retention sweeper stopped");

    state.tasks.close();
    let in_flight = state.tasks.len();
    if in_flight > 0 {
        tracing::info!(in_flight, "Waiting for in-flight conversions");
    }
    if tokio::time::timeout(config.shutdown_timeout(), state.tasks.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            remaining = state.tasks.len(),
            "Shutdown grace period elapsed with conversions still running"
        );
    }

    let observers = state.registry.observer_count().await;
    tracing::info!(observers, "Closing remaining observer connections");
    state.registry.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "docconv_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
    }
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise an in-memory store.
async fn connect_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn JobStore>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; jobs are kept in memory and lost on restart");
        return Ok(Arc::new(MemoryJobStore::new()));
    };

    let pool = docconv_db::create_pool(database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    docconv_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    docconv_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(Arc::new(PgJobStore::new(pool)))
}

/// Wait for a termination signal, then cancel `shutdown`.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix). Cancelling the token
/// stops the retention sweeper and makes new uploads fail with 503.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }

    shutdown.cancel();
}
