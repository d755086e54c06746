//! Event fan-out entry point.
//!
//! [`EventBroadcaster`] is what request handlers and background jobs call.
//! A broadcast is delivered to this instance's clients first, then published
//! once to the broker so other instances can deliver it to theirs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulseboard_core::channels::{team_channel, ADMIN_CHANNEL};
use pulseboard_core::types::DbId;

use crate::envelope::{EventMessage, RelayFrame};
use crate::registry::ConnectionRegistry;

/// Longest a broadcast waits on the broker before giving up on the relay.
pub const PUBLISH_TIMEOUT_SECS: u64 = 5;

// ---------------------------------------------------------------------------
// Publisher seam
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Timed out after {0}s waiting for Redis")]
    Timeout(u64),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound side of the broker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), PublishError>;
}

// ---------------------------------------------------------------------------
// EventBroadcaster
// ---------------------------------------------------------------------------

pub struct EventBroadcaster {
    registry: Arc<ConnectionRegistry>,
    publisher: Option<Arc<dyn EventPublisher>>,
    instance_id: String,
}

impl EventBroadcaster {
    /// A broadcaster with no broker: events only reach this instance.
    pub fn new(registry: Arc<ConnectionRegistry>, instance_id: impl Into<String>) -> Self {
        Self {
            registry,
            publisher: None,
            instance_id: instance_id.into(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn is_distributed(&self) -> bool {
        self.publisher.is_some()
    }

    /// Send `event_name` to every client of `team_id` on every instance.
    ///
    /// Returns the number of clients reached on this instance. Broker
    /// failures are logged and never surface to the caller.
    pub async fn broadcast(&self, team_id: DbId, event_name: &str, payload: serde_json::Value) -> usize {
        let Some((message, text)) = encode(event_name, payload) else {
            return 0;
        };
        let delivered = self.registry.send_local(team_id, &text).await;
        tracing::debug!(team_id, event = event_name, delivered, "Broadcast team event");

        self.relay(&team_channel(team_id), message).await;
        delivered
    }

    /// Send `event_name` to every admin client on every instance.
    pub async fn broadcast_admin(&self, event_name: &str, payload: serde_json::Value) -> usize {
        let Some((message, text)) = encode(event_name, payload) else {
            return 0;
        };
        let delivered = self.registry.send_local_admin(&text).await;
        tracing::debug!(event = event_name, delivered, "Broadcast admin event");

        self.relay(ADMIN_CHANNEL, message).await;
        delivered
    }

    /// Team broadcast followed by the same event to admins.
    pub async fn broadcast_with_admin(
        &self,
        team_id: DbId,
        event_name: &str,
        payload: serde_json::Value,
    ) {
        self.broadcast(team_id, event_name, payload.clone()).await;
        self.broadcast_admin(event_name, payload).await;
    }

    async fn relay(&self, channel: &str, message: EventMessage) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        let frame = RelayFrame::new(&self.instance_id, message);
        let result = match frame.to_text() {
            Ok(payload) => tokio::time::timeout(
                Duration::from_secs(PUBLISH_TIMEOUT_SECS),
                publisher.publish(channel, payload),
            )
            .await
            .unwrap_or(Err(PublishError::Timeout(PUBLISH_TIMEOUT_SECS))),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(channel, error = %e, "Failed to publish event to broker");
        }
    }
}

fn encode(event_name: &str, payload: serde_json::Value) -> Option<(EventMessage, String)> {
    let message = EventMessage::new(event_name, payload);
    match message.to_text() {
        Ok(text) => Some((message, text)),
        Err(e) => {
            tracing::error!(event = event_name, error = %e, "Failed to encode event");
            None
        }
    }
}
