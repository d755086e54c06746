//! Cross-instance relay over Redis pub/sub.
//!
//! Broker bodies are the client envelope, optionally tagged with a
//! top-level `origin`. Every instance publishes on `team:<id>:events` and
//! `admin:events`, and subscribes to `team:*:events` plus `admin:events`.
//! Frames received from the broker are only ever handed to the local
//! registry. Nothing on the receive path can publish, so one broadcast
//! produces exactly one broker message no matter how many instances run.
//!
//! The broker echoes a publisher's own frames back to it. Those are
//! recognized by the `origin` instance id and dropped, because the
//! publishing instance already delivered locally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pulseboard_core::channels::{parse_team_channel, ADMIN_CHANNEL, TEAM_CHANNEL_PATTERN};
use pulseboard_core::types::DbId;
use redis::aio::{MultiplexedConnection, PubSub};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::{EventPublisher, PublishError};
use crate::envelope::RelayFrame;
use crate::registry::ConnectionRegistry;

/// Timeout for connecting and subscribing.
const REDIS_TIMEOUT_SECS: u64 = 5;

/// Initial backoff delay for subscriber reconnection.
const INITIAL_BACKOFF_SECS: u64 = 1;

/// Maximum backoff delay for subscriber reconnection.
const MAX_BACKOFF_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Receive side
// ---------------------------------------------------------------------------

/// What happened to one frame received from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Team { team_id: DbId, delivered: usize },
    Admin { delivered: usize },
    /// Published by this instance; already delivered locally.
    SelfEcho,
    /// Unknown channel or undecodable payload.
    Dropped,
}

/// Hands frames received from the broker to the local registry.
pub struct PubSubBridge {
    registry: Arc<ConnectionRegistry>,
    instance_id: String,
}

impl PubSubBridge {
    pub fn new(registry: Arc<ConnectionRegistry>, instance_id: impl Into<String>) -> Self {
        Self {
            registry,
            instance_id: instance_id.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Route one broker frame to local clients. Never publishes.
    pub async fn dispatch(&self, channel: &str, payload: &str) -> Dispatch {
        let frame = match RelayFrame::parse(payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(channel, error = %e, "Dropping undecodable broker frame");
                return Dispatch::Dropped;
            }
        };
        if frame.origin.as_deref() == Some(self.instance_id.as_str()) {
            return Dispatch::SelfEcho;
        }
        let text = match frame.message.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(channel, error = %e, "Dropping unencodable broker frame");
                return Dispatch::Dropped;
            }
        };

        if channel == ADMIN_CHANNEL {
            let delivered = self.registry.send_local_admin(&text).await;
            return Dispatch::Admin { delivered };
        }
        match parse_team_channel(channel) {
            Some(team_id) => {
                let delivered = self.registry.send_local(team_id, &text).await;
                Dispatch::Team { team_id, delivered }
            }
            None => {
                tracing::debug!(channel, "Dropping frame from unknown channel");
                Dispatch::Dropped
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// Publishes relay frames with `PUBLISH` on a multiplexed connection.
pub struct RedisPublisher {
    conn: MultiplexedConnection,
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), PublishError> {
        let mut conn = self.conn.clone();
        with_timeout(
            redis::cmd("PUBLISH")
                .arg(channel)
                .arg(payload)
                .query_async::<i64>(&mut conn),
        )
        .await?;
        Ok(())
    }
}

/// The Redis publisher and the background subscriber task.
pub struct RedisBridge {
    publisher: Arc<RedisPublisher>,
    cancel: CancellationToken,
    subscriber: JoinHandle<()>,
}

impl RedisBridge {
    /// Connect both halves and start the subscriber.
    ///
    /// Errors here mean the broker is unreachable at startup; the caller runs
    /// local-only. Later disconnects are retried in the background.
    pub async fn connect(redis_url: &str, bridge: PubSubBridge) -> Result<Self, PublishError> {
        let client = redis::Client::open(redis_url)?;

        let conn = with_timeout(client.get_multiplexed_async_connection()).await?;
        let pubsub = subscribe(&client).await?;

        tracing::info!(
            instance_id = bridge.instance_id(),
            "Redis pub/sub connected, listening to {TEAM_CHANNEL_PATTERN} and {ADMIN_CHANNEL}"
        );

        let cancel = CancellationToken::new();
        let subscriber = tokio::spawn(run_subscriber(client, pubsub, bridge, cancel.clone()));

        Ok(Self {
            publisher: Arc::new(RedisPublisher { conn }),
            cancel,
            subscriber,
        })
    }

    pub fn publisher(&self) -> Arc<dyn EventPublisher> {
        self.publisher.clone()
    }

    /// Stop the subscriber and release its connection. Errors are ignored.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.subscriber.await {
            tracing::debug!(error = %e, "Redis subscriber task ended abnormally");
        }
        tracing::info!("Redis pub/sub bridge stopped");
    }
}

async fn with_timeout<T>(
    fut: impl std::future::Future<Output = redis::RedisResult<T>>,
) -> Result<T, PublishError> {
    match timeout(Duration::from_secs(REDIS_TIMEOUT_SECS), fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(PublishError::Timeout(REDIS_TIMEOUT_SECS)),
    }
}

async fn subscribe(client: &redis::Client) -> Result<PubSub, PublishError> {
    let mut pubsub = with_timeout(client.get_async_pubsub()).await?;
    with_timeout(pubsub.psubscribe(TEAM_CHANNEL_PATTERN)).await?;
    with_timeout(pubsub.subscribe(ADMIN_CHANNEL)).await?;
    Ok(pubsub)
}

/// Drain the subscription until cancelled, reconnecting with exponential
/// backoff when the connection drops.
async fn run_subscriber(
    client: redis::Client,
    pubsub: PubSub,
    bridge: PubSubBridge,
    cancel: CancellationToken,
) {
    let mut current = Some(pubsub);
    let mut backoff_secs = INITIAL_BACKOFF_SECS;

    loop {
        if let Some(mut pubsub) = current.take() {
            backoff_secs = INITIAL_BACKOFF_SECS;
            let cancelled = drain(&mut pubsub, &bridge, &cancel).await;
            if cancelled {
                let _ = with_timeout(pubsub.punsubscribe(TEAM_CHANNEL_PATTERN)).await;
                let _ = with_timeout(pubsub.unsubscribe(ADMIN_CHANNEL)).await;
                return;
            }
            tracing::warn!("Redis subscriber disconnected, reconnecting");
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
        }
        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);

        match subscribe(&client).await {
            Ok(pubsub) => {
                tracing::info!("Redis subscriber reconnected");
                current = Some(pubsub);
            }
            Err(e) => {
                tracing::warn!(error = %e, backoff_secs, "Redis subscriber failed to reconnect");
            }
        }
    }
}

/// Returns `true` when stopped by cancellation, `false` when the stream ended.
async fn drain(pubsub: &mut PubSub, bridge: &PubSubBridge, cancel: &CancellationToken) -> bool {
    let mut stream = pubsub.on_message();
    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => return true,
            msg = stream.next() => msg,
        };
        let Some(msg) = msg else {
            return false;
        };

        let channel = msg.get_channel_name().to_string();
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(channel, error = %e, "Dropping non-text broker payload");
                continue;
            }
        };
        let outcome = bridge.dispatch(&channel, &payload).await;
        tracing::trace!(channel, ?outcome, "Dispatched broker frame");
    }
}
