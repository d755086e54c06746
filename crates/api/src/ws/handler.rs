use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use pulseboard_core::event_names::EVENT_CONNECTED;
use pulseboard_db::models::team::Team;
use pulseboard_events::{
    ClientConnection, ConnectionId, ConnectionRegistry, ConnectionScope, ConnectionState,
    EventMessage, Outbound,
};
use serde::Deserialize;
use serde_json::json;

use super::protocol::{
    ClientMessage, ServerReply, CLOSE_INTERNAL_ERROR, CLOSE_INVALID_CREDENTIALS,
    CLOSE_MISSING_CREDENTIALS,
};
use crate::middleware::auth::{find_team_by_key, is_admin_key};
use crate::state::AppState;

/// How long a server-initiated close waits for the Close frame to flush.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Credentials accepted on the upgrade URL.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub api_key: Option<String>,
    pub admin_key: Option<String>,
}

enum Identity {
    Team(Team),
    Admin,
}

struct Rejection {
    code: u16,
    reason: &'static str,
}

/// HTTP handler that upgrades the connection to WebSocket.
///
/// Credentials are checked after the upgrade so a rejection can carry a
/// close code the client can act on.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn authenticate(state: &AppState, query: &WsQuery) -> Result<Identity, Rejection> {
    if let Some(key) = non_empty(&query.admin_key) {
        return if is_admin_key(state, key) {
            Ok(Identity::Admin)
        } else {
            Err(Rejection {
                code: CLOSE_INVALID_CREDENTIALS,
                reason: "Invalid admin key",
            })
        };
    }

    let Some(key) = non_empty(&query.api_key) else {
        return Err(Rejection {
            code: CLOSE_MISSING_CREDENTIALS,
            reason: "Missing apiKey or adminKey",
        });
    };

    match find_team_by_key(state, key).await {
        Ok(Some(team)) => Ok(Identity::Team(team)),
        Ok(None) => Err(Rejection {
            code: CLOSE_INVALID_CREDENTIALS,
            reason: "Invalid API key",
        }),
        Err(e) => {
            tracing::error!(error = %e, "WebSocket authentication failed");
            Err(Rejection {
                code: CLOSE_INTERNAL_ERROR,
                reason: "Authentication unavailable",
            })
        }
    }
}

fn non_empty(key: &Option<String>) -> Option<&str> {
    key.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

/// Manage a single WebSocket connection after upgrade.
///
/// 1. Authenticates and queues the `connected` event.
/// 2. Registers the connection with the registry.
/// 3. Spawns a sender task draining the connection's outbound queue.
/// 4. Answers pings on the current task until either side closes.
/// 5. Unregisters on disconnect.
async fn handle_socket(mut socket: WebSocket, state: AppState, query: WsQuery) {
    let identity = match authenticate(&state, &query).await {
        Ok(identity) => identity,
        Err(rejection) => {
            tracing::info!(code = rejection.code, reason = rejection.reason, "WebSocket rejected");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: rejection.code,
                    reason: rejection.reason.into(),
                })))
                .await;
            return;
        }
    };

    let scope = match &identity {
        Identity::Team(team) => ConnectionScope::Team(team.id),
        Identity::Admin => ConnectionScope::Admin,
    };
    let (conn, mut rx) = ClientConnection::new(scope);
    let conn_id = conn.id();
    conn.open();

    let connected = match &identity {
        Identity::Team(team) => json!({
            "connectionId": conn_id,
            "scope": "team",
            "teamId": team.id,
            "teamName": team.name,
        }),
        Identity::Admin => json!({ "connectionId": conn_id, "scope": "admin" }),
    };

    // Queued before registration so no broadcast can precede it.
    match EventMessage::new(EVENT_CONNECTED, connected).to_text() {
        Ok(text) => {
            let _ = conn.send_text(&text);
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode connected event"),
    }

    let registry = Arc::clone(&state.registry);
    match &identity {
        Identity::Team(team) => {
            registry.register_team_name(team.id, &team.name).await;
            registry.add_connection(team.id, Arc::clone(&conn)).await;
        }
        Identity::Admin => {
            registry.add_admin_connection(Arc::clone(&conn)).await;
        }
    }
    tracing::info!(conn_id = %conn_id, scope = ?scope, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward queued frames to the WebSocket sink.
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let (message, last) = match frame {
                Outbound::Text(text) => (Message::Text(text.into()), false),
                Outbound::Ping => (Message::Ping(Bytes::new()), false),
                Outbound::Close { code, reason } => (
                    Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })),
                    true,
                ),
            };
            if sink.send(message).await.is_err() {
                tracing::debug!(conn_id = %conn_id, "WebSocket sink closed");
                break;
            }
            if last {
                break;
            }
        }
    });

    // Receiver loop: answer pings until the client leaves or the registry
    // closes the connection.
    let mut state_rx = conn.subscribe_state();
    let closed_by_server = loop {
        if *state_rx.borrow_and_update() == ConnectionState::Closed {
            break true;
        }
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break true;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_text(&conn, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break false,
                Some(Ok(Message::Pong(_))) => {
                    tracing::trace!(conn_id = %conn_id, "Pong received");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                    break false;
                }
            }
        }
    };

    conn.close();
    unregister(&registry, scope, conn_id).await;

    if closed_by_server {
        let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut send_task).await;
    }
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

fn handle_text(conn: &ClientConnection, text: &str) {
    match ClientMessage::parse(text) {
        Some(ClientMessage::Ping) => {
            let reply = ServerReply::Pong {
                timestamp: chrono::Utc::now(),
            };
            if let Ok(text) = serde_json::to_string(&reply) {
                let _ = conn.send_text(&text);
            }
        }
        None => {
            tracing::trace!(conn_id = %conn.id(), "Ignoring client message");
        }
    }
}

async fn unregister(registry: &ConnectionRegistry, scope: ConnectionScope, conn_id: ConnectionId) {
    match scope {
        ConnectionScope::Team(team_id) => {
            registry.remove_connection(team_id, conn_id).await;
        }
        ConnectionScope::Admin => {
            registry.remove_admin_connection(conn_id).await;
        }
    }
}
