use std::sync::Arc;
use std::time::Duration;

use crate::ws::registry::ObserverRegistry;

/// Spawn a background task that sends periodic Ping frames to every
/// registered observer.
///
/// The task runs until aborted through the returned handle during shutdown.
pub fn start_heartbeat(
    registry: Arc<ObserverRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; nobody is connected yet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = registry.ping_all().await;
            tracing::debug!(
                delivered = report.delivered,
                failed = report.failed,
                "Observer heartbeat ping"
            );
        }
    })
}
