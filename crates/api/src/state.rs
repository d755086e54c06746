use std::sync::Arc;

use pulseboard_db::{ResultStore, RetryRequestStore, StoreHealth, TeamStore};
use pulseboard_events::{ConnectionRegistry, EventBroadcaster};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub health: Arc<dyn StoreHealth>,
    pub teams: Arc<dyn TeamStore>,
    pub results: Arc<dyn ResultStore>,
    pub retries: Arc<dyn RetryRequestStore>,
    /// WebSocket connections on this instance.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out to local clients and, when configured, other instances.
    pub broadcaster: Arc<EventBroadcaster>,
}

impl AppState {
    /// Wire every store trait to the same backing `store`.
    pub fn new<S>(config: ServerConfig, store: Arc<S>, broadcaster: Arc<EventBroadcaster>) -> Self
    where
        S: StoreHealth + TeamStore + ResultStore + RetryRequestStore + 'static,
    {
        Self {
            config: Arc::new(config),
            health: store.clone(),
            teams: store.clone(),
            results: store.clone(),
            retries: store,
            registry: Arc::clone(broadcaster.registry()),
            broadcaster,
        }
    }
}
