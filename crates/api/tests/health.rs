//! Integration tests for the health endpoint and shared middleware.

mod common;

use axum::http::{Method, Request, StatusCode};
use common::{body_json, build_test_app, get, team_listener};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Test: health check returns 200 with store and broker status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_check() {
    let app = build_test_app().await;

    let response = get(&app, "/health", None).await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["dbHealthy"], true);
    assert_eq!(json["brokerEnabled"], false);
    assert_eq!(json["connections"], 0);
    assert!(json["version"].is_string());
}

// ---------------------------------------------------------------------------
// Test: health check counts open connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_counts_connections() {
    let app = build_test_app().await;
    let _rx = team_listener(&app.state, app.team.id).await;

    let json = body_json(get(&app, "/health", None).await).await;

    assert_eq!(json["connections"], 1);
}

// ---------------------------------------------------------------------------
// Test: unknown routes return 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let app = build_test_app().await;

    let response = get(&app, "/api/v1/nonexistent", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: every response carries a request id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = build_test_app().await;

    let response = get(&app, "/health", None).await;

    assert!(response.headers().contains_key("x-request-id"));
}

// ---------------------------------------------------------------------------
// Test: CORS preflight allows PATCH from a configured origin
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cors_preflight() {
    let app = build_test_app().await;

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/v1/retry-requests/1")
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "PATCH")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://localhost:5173"
    );
}
