pub mod converts;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                          WebSocket (job events)
///
/// /converts                    list, upload
/// /converts/{id}               get (with links), delete
/// /convert-outcomes/{id}       download converted HTML
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/converts", converts::router())
        .nest("/convert-outcomes", converts::outcomes_router())
}
