pub mod admin;
pub mod health;
pub mod results;
pub mod retry_requests;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                   WebSocket (?apiKey= or ?adminKey=)
///
/// /retry-requests                       create (team)
/// /retry-requests/pending               pending for the team
/// /retry-requests/{id}                  get, update status
///
/// /results                              record a result
/// /results/{id}/artifacts               register an artifact
///
/// /admin/retry-requests                 list across teams (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/retry-requests", retry_requests::router())
        .nest("/results", results::router())
        .nest("/admin", admin::router())
}
