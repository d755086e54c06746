use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use pulseboard_core::tasks::RecurringTask;
use pulseboard_db::PgStore;
use pulseboard_events::{ConnectionRegistry, EventBroadcaster, PubSubBridge, RedisBridge};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulseboard_api::background::ExpirySweeper;
use pulseboard_api::config::ServerConfig;
use pulseboard_api::router::build_app_router;
use pulseboard_api::state::AppState;
use pulseboard_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pulseboard_api=debug,pulseboard_events=info,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = pulseboard_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    pulseboard_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    pulseboard_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgStore::new(pool));

    // --- Event distribution ---
    let instance_id = uuid::Uuid::new_v4().to_string();
    let connections = Arc::new(ConnectionRegistry::new());
    let mut broadcaster = EventBroadcaster::new(Arc::clone(&connections), instance_id.clone());

    let redis_bridge = match &config.redis_url {
        Some(url) => {
            let bridge = PubSubBridge::new(Arc::clone(&connections), instance_id.clone());
            match RedisBridge::connect(url, bridge).await {
                Ok(redis) => {
                    broadcaster = broadcaster.with_publisher(redis.publisher());
                    Some(redis)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis unavailable, events stay on this instance");
                    None
                }
            }
        }
        None => {
            tracing::info!("REDIS_URL not set, running as a single instance");
            None
        }
    };
    let broadcaster = Arc::new(broadcaster);
    tracing::info!(instance_id = %instance_id, distributed = broadcaster.is_distributed(), "Event broadcaster ready");

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&connections),
        Duration::from_secs(config.heartbeat_interval_secs),
    );

    // --- App state ---
    let state = AppState::new(config.clone(), store, Arc::clone(&broadcaster));

    // --- Expiry sweeper ---
    let sweeper = Arc::new(ExpirySweeper::new(
        Arc::clone(&state.retries),
        Arc::clone(&broadcaster),
    ));
    let sweeper_task = RecurringTask::start(sweeper, Duration::from_secs(config.sweep_interval_secs));

    // --- Start server ---
    let app = build_app_router(state);
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);

    if tokio::time::timeout(shutdown_timeout, sweeper_task.stop())
        .await
        .is_err()
    {
        tracing::warn!("Expiry sweeper did not stop in time");
    }

    let ws_count = connections.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    connections.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    if let Some(redis) = redis_bridge {
        let _ = tokio::time::timeout(shutdown_timeout, redis.shutdown()).await;
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
