use std::sync::Arc;
use std::time::Duration;

use pulseboard_core::tasks::RecurringTask;
use pulseboard_watcher::{ApiClient, CommandRunner, RetryWatcher, WatcherConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pulseboard_watcher=info".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WatcherConfig::from_env().expect("Invalid watcher configuration");
    tracing::info!(
        api = %config.api_base_url,
        runner = %config.runner_program,
        poll_interval_secs = config.poll_interval_secs,
        "Loaded watcher configuration",
    );

    let client = ApiClient::new(config.api_base_url.clone(), config.api_key.clone());
    let runner = CommandRunner::new(config.runner_program.clone(), config.runner_args.clone())
        .with_workdir(config.runner_workdir.clone());
    let watcher = Arc::new(RetryWatcher::new(Arc::new(client), Arc::new(runner)));

    // First tick fires immediately.
    let task = RecurringTask::start(watcher, Duration::from_secs(config.poll_interval_secs));

    shutdown_signal().await;

    tracing::info!("Waiting for the current poll cycle to finish");
    task.stop().await;
    tracing::info!("Retry watcher stopped");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM (on Unix).
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
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
