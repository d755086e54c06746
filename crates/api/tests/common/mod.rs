#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pulseboard_api::config::ServerConfig;
use pulseboard_api::router::build_app_router;
use pulseboard_api::state::AppState;
use pulseboard_core::credentials::hash_api_key;
use pulseboard_db::models::team::Team;
use pulseboard_db::{MemoryStore, TeamStore};
use pulseboard_events::{
    ClientConnection, ConnectionRegistry, ConnectionScope, EventBroadcaster, EventPublisher,
    Outbound,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

pub const TEAM_KEY: &str = "team-alpha-key";
pub const OTHER_TEAM_KEY: &str = "team-beta-key";
pub const ADMIN_KEY: &str = "admin-key";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: "postgres://unused".to_string(),
        redis_url: None,
        admin_api_key: ADMIN_KEY.to_string(),
        sweep_interval_secs: 60,
        heartbeat_interval_secs: 30,
    }
}

/// An application over an in-memory store with two teams.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub team: Team,
    pub other_team: Team,
}

/// Build the full application router with all middleware layers, backed by
/// a [`MemoryStore`].
pub async fn build_test_app() -> TestApp {
    build_app(None).await
}

/// Same as [`build_test_app`] with events relayed through `publisher`.
pub async fn build_test_app_with_publisher(publisher: Arc<dyn EventPublisher>) -> TestApp {
    build_app(Some(publisher)).await
}

async fn build_app(publisher: Option<Arc<dyn EventPublisher>>) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let team = store
        .create_team("Alpha", &hash_api_key(TEAM_KEY))
        .await
        .unwrap();
    let other_team = store
        .create_team("Beta", &hash_api_key(OTHER_TEAM_KEY))
        .await
        .unwrap();

    let registry = Arc::new(ConnectionRegistry::new());
    let mut broadcaster = EventBroadcaster::new(registry, "test-instance");
    if let Some(publisher) = publisher {
        broadcaster = broadcaster.with_publisher(publisher);
    }
    let broadcaster = Arc::new(broadcaster);
    let state = AppState::new(test_config(), store.clone(), broadcaster);

    TestApp {
        router: build_app_router(state.clone()),
        state,
        store,
        team,
        other_team,
    }
}

/// Attach an open in-process client to `team_id` and return its frame queue.
pub async fn team_listener(state: &AppState, team_id: i64) -> UnboundedReceiver<Outbound> {
    let (conn, rx) = ClientConnection::new(ConnectionScope::Team(team_id));
    conn.open();
    state.registry.add_connection(team_id, conn).await;
    rx
}

pub async fn admin_listener(state: &AppState) -> UnboundedReceiver<Outbound> {
    let (conn, rx) = ClientConnection::new(ConnectionScope::Admin);
    conn.open();
    state.registry.add_admin_connection(conn).await;
    rx
}

/// Event names received so far, in order.
pub fn received_events(rx: &mut UnboundedReceiver<Outbound>) -> Vec<serde_json::Value> {
    let mut events = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let Outbound::Text(text) = frame {
            events.push(serde_json::from_str(&text).unwrap());
        }
    }
    events
}

pub async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    key: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {key}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str, key: Option<&str>) -> Response<Body> {
    send(app, Method::GET, uri, key, None).await
}

pub async fn post_json(
    app: &TestApp,
    uri: &str,
    key: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::POST, uri, Some(key), Some(body)).await
}

pub async fn patch_json(
    app: &TestApp,
    uri: &str,
    key: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::PATCH, uri, Some(key), Some(body)).await
}

/// Collect a response body as JSON (`Null` for an empty body).
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

/// Assert `status` and return the body.
pub async fn expect_status(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}

/// Record a result through the API and return its `data`.
pub async fn record_result(app: &TestApp, key: &str, title: &str, status: &str) -> serde_json::Value {
    let response = post_json(
        app,
        "/api/v1/results",
        key,
        serde_json::json!({ "testTitle": title, "status": status, "durationMs": 1200 }),
    )
    .await;
    expect_status(response, StatusCode::CREATED).await["data"].clone()
}

/// Request a retry of the test case behind `title` and return its `data`.
pub async fn request_retry(app: &TestApp, key: &str, title: &str) -> serde_json::Value {
    let result = record_result(app, key, title, "FAILED").await;
    let response = post_json(
        app,
        "/api/v1/retry-requests",
        key,
        serde_json::json!({ "testCaseId": result["testCaseId"] }),
    )
    .await;
    expect_status(response, StatusCode::CREATED).await["data"].clone()
}
