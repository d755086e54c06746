//! A single client connection and its lifecycle.
//!
//! ```text
//! Connecting --open()--> Open --close()--> Closed
//!      |                                     ^
//!      +-------------close()-----------------+
//! ```
//!
//! Outbound frames are queued on an unbounded FIFO channel drained by the
//! socket writer, so frames reach one connection in the order they were
//! sent. Only an `Open` connection accepts frames.

use std::sync::Arc;

use pulseboard_core::types::DbId;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Who a connection receives events for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionScope {
    Team(DbId),
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// A frame queued for the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close { code: u16, reason: String },
}

/// Why a frame was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection is not open")]
    NotOpen,
    #[error("connection writer has gone away")]
    WriterGone,
}

pub struct ClientConnection {
    id: ConnectionId,
    scope: ConnectionScope,
    state: watch::Sender<ConnectionState>,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ClientConnection {
    /// Create a connection in `Connecting`, returning the receiver the socket
    /// writer drains.
    pub fn new(scope: ConnectionScope) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let conn = Self {
            id: Uuid::new_v4(),
            scope,
            state,
            sender,
        };
        (Arc::new(conn), receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn scope(&self) -> ConnectionScope {
        self.scope
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Observe state changes, e.g. to stop the socket reader once the
    /// registry prunes this connection.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// `Connecting -> Open`. Returns `false` from any other state.
    pub fn open(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Open;
                true
            } else {
                false
            }
        })
    }

    /// Move to `Closed`. Returns `false` if it already was.
    pub fn close(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Closed {
                false
            } else {
                *state = ConnectionState::Closed;
                true
            }
        })
    }

    /// Queue a close frame (if still open) and mark the connection closed.
    pub fn close_with(&self, code: u16, reason: &str) {
        if self.is_open() {
            let _ = self.sender.send(Outbound::Close {
                code,
                reason: reason.to_string(),
            });
        }
        self.close();
    }

    /// Queue a frame. A dead writer closes the connection.
    pub fn send(&self, frame: Outbound) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        self.sender.send(frame).map_err(|_| {
            self.close();
            SendError::WriterGone
        })
    }

    pub fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.send(Outbound::Text(text.to_string()))
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves_forward_only() {
        let (conn, _rx) = ClientConnection::new(ConnectionScope::Admin);
        assert_eq!(conn.state(), ConnectionState::Connecting);

        assert!(conn.open());
        assert!(!conn.open());
        assert_eq!(conn.state(), ConnectionState::Open);

        assert!(conn.close());
        assert!(!conn.close());
        assert!(!conn.open());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn frames_are_refused_unless_open() {
        let (conn, mut rx) = ClientConnection::new(ConnectionScope::Team(1));
        assert_eq!(conn.send_text("early"), Err(SendError::NotOpen));

        conn.open();
        conn.send_text("a").unwrap();
        conn.send_text("b").unwrap();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Text("a".into()));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Text("b".into()));

        conn.close();
        assert_eq!(conn.send_text("late"), Err(SendError::NotOpen));
    }

    #[test]
    fn dropped_writer_closes_connection_on_send() {
        let (conn, rx) = ClientConnection::new(ConnectionScope::Team(1));
        conn.open();
        drop(rx);

        assert_eq!(conn.send_text("x"), Err(SendError::WriterGone));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn state_watchers_see_close() {
        let (conn, _rx) = ClientConnection::new(ConnectionScope::Admin);
        conn.open();
        let mut watcher = conn.subscribe_state();

        conn.close_with(1001, "going away");

        watcher.changed().await.unwrap();
        assert_eq!(*watcher.borrow(), ConnectionState::Closed);
    }
}
