use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::registry::{ObserverRegistry, ObserverSink, SinkError};

/// Outbound half of an upgraded WebSocket.
struct SocketSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl ObserverSink for SocketSink {
    async fn send(&mut self, message: Message) -> Result<(), SinkError> {
        self.0.send(message).await.map_err(Into::into)
    }
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection's sink is registered with the
/// `ObserverRegistry` and its inbound stream is read until it closes.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Inbound frames carry no commands; the read loop only exists to notice
/// the peer going away. Close frames, read errors and protocol violations
/// all end the loop and unregister the observer.
async fn handle_socket(socket: WebSocket, registry: Arc<ObserverRegistry>) {
    let (sink, mut stream) = socket.split();
    let observer_id = registry.register(Box::new(SocketSink(sink))).await;
    tracing::info!(observer_id = %observer_id, "Observer connected");

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(observer_id = %observer_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(observer_id = %observer_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    registry.unregister(observer_id).await;
    tracing::info!(observer_id = %observer_id, "Observer disconnected");
}
