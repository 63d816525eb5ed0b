//! Route definitions for conversion jobs and their outcomes.

use axum::routing::get;
use axum::Router;

use crate::handlers::converts;
use crate::state::AppState;

/// Routes mounted at `/converts`.
///
/// ```text
/// GET    /                -> list_converts
/// POST   /                -> create_convert
/// GET    /{id}            -> get_convert
/// DELETE /{id}            -> delete_convert
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(converts::list_converts).post(converts::create_convert))
        .route(
            "/{id}",
            get(converts::get_convert).delete(converts::delete_convert),
        )
}

/// Routes mounted at `/convert-outcomes`.
///
/// ```text
/// GET    /{id}            -> download_outcome
/// ```
pub fn outcomes_router() -> Router<AppState> {
    Router::new().route("/{id}", get(converts::download_outcome))
}
