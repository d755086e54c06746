use axum::routing::post;
use axum::Router;

use crate::handlers::results;
use crate::state::AppState;

/// Mounted at `/results`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(results::create_result))
        .route("/{id}/artifacts", post(results::create_artifact))
}
