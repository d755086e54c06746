use axum::routing::{get, post};
use axum::Router;

use crate::handlers::retry_requests;
use crate::state::AppState;

/// Mounted at `/retry-requests`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(retry_requests::create_retry_request))
        .route("/pending", get(retry_requests::list_pending))
        .route(
            "/{id}",
            get(retry_requests::get_retry_request).patch(retry_requests::update_retry_request),
        )
}
