use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::Message;
use docconv_core::types::{self, Timestamp};
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};

use crate::ws::event::JobEvent;

/// Identifier assigned to an observer when it registers.
pub type ObserverId = uuid::Uuid;

/// Error returned by an observer's outbound sink.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Outbound half of an observer's connection.
///
/// Implemented for the WebSocket sink in the upgrade handler; tests supply
/// their own recording sinks.
#[async_trait]
pub trait ObserverSink: Send {
    async fn send(&mut self, message: Message) -> Result<(), SinkError>;
}

/// A registered observer.
///
/// Writes go through `sink`'s mutex so two concurrent broadcasts can never
/// interleave frames on the same connection.
pub struct Observer {
    id: ObserverId,
    connected_at: Timestamp,
    sink: Mutex<Box<dyn ObserverSink>>,
}

impl Observer {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    async fn deliver(&self, message: Message) -> Result<(), SinkError> {
        self.sink.lock().await.send(message).await
    }
}

/// Outcome of delivering one frame to the current membership.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// The set of live observers.
///
/// Thread-safe via interior `RwLock`; wrapped in `Arc` and shared across the
/// application.
pub struct ObserverRegistry {
    observers: RwLock<HashMap<ObserverId, Arc<Observer>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
        }
    }

    /// Add an observer. It receives every event broadcast after this returns.
    pub async fn register(&self, sink: Box<dyn ObserverSink>) -> ObserverId {
        let observer = Arc::new(Observer {
            id: uuid::Uuid::new_v4(),
            connected_at: types::now(),
            sink: Mutex::new(sink),
        });
        let id = observer.id;
        self.observers.write().await.insert(id, observer);
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: ObserverId) -> bool {
        self.observers.write().await.remove(&id).is_some()
    }

    /// Serialize `event` once and deliver it to every registered observer.
    pub async fn broadcast(&self, event: &JobEvent) -> BroadcastReport {
        match event.to_message() {
            Ok(message) => self.broadcast_message(message).await,
            Err(e) => {
                tracing::error!(job_id = %event.job_id(), error = %e, "Failed to serialize job event");
                BroadcastReport::default()
            }
        }
    }

    /// Deliver a frame to every registered observer.
    ///
    /// Sends run concurrently outside the membership lock; a failing or slow
    /// observer does not hold up the others. Failed observers stay
    /// registered until their own read loop ends.
    pub async fn broadcast_message(&self, message: Message) -> BroadcastReport {
        let observers = self.snapshot().await;
        if observers.is_empty() {
            return BroadcastReport::default();
        }

        let sends = observers.iter().map(|observer| {
            let message = message.clone();
            async move { (observer.id, observer.deliver(message).await) }
        });

        let mut report = BroadcastReport::default();
        for (observer_id, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(observer_id = %observer_id, error = %e, "Failed to deliver to observer");
                }
            }
        }
        report
    }

    /// Send a frame to one observer. Returns `false` if it is not registered
    /// or the send failed.
    pub async fn send_to(&self, id: ObserverId, message: Message) -> bool {
        let observer = self.observers.read().await.get(&id).cloned();
        let Some(observer) = observer else {
            return false;
        };
        match observer.deliver(message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(observer_id = %id, error = %e, "Failed to deliver to observer");
                false
            }
        }
    }

    /// Send a Ping frame to every observer.
    pub async fn ping_all(&self) -> BroadcastReport {
        self.broadcast_message(Message::Ping(Bytes::new())).await
    }

    /// Send a Close frame to every observer, then clear the set.
    pub async fn shutdown_all(&self) {
        let observers: Vec<Arc<Observer>> =
            self.observers.write().await.drain().map(|(_, o)| o).collect();
        let count = observers.len();
        join_all(
            observers
                .iter()
                .map(|observer| observer.deliver(Message::Close(None))),
        )
        .await;
        tracing::info!(count, "Closed all observer connections");
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    async fn snapshot(&self) -> Vec<Arc<Observer>> {
        self.observers.read().await.values().cloned().collect()
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
