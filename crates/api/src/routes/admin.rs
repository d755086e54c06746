use axum::routing::get;
use axum::Router;

use crate::handlers::retry_requests;
use crate::state::AppState;

/// Mounted at `/admin`.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/retry-requests",
        get(retry_requests::list_all_retry_requests),
    )
}
