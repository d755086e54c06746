//! Client-to-server messages and close codes.

use pulseboard_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// No `apiKey` or `adminKey` was supplied.
pub const CLOSE_MISSING_CREDENTIALS: u16 = 4001;

/// The supplied key matched no team, or was not the admin key.
pub const CLOSE_INVALID_CREDENTIALS: u16 = 4003;

/// Authentication could not be completed.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Messages a client may send. Anything else is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
}

/// Replies to [`ClientMessage`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerReply {
    Pong { timestamp: Timestamp },
}

impl ClientMessage {
    /// Parse a text frame, or `None` if it is not a known message.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_is_recognized() {
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#), Some(ClientMessage::Ping));
        assert_eq!(ClientMessage::parse(r#"{"type":"subscribe"}"#), None);
        assert_eq!(ClientMessage::parse("ping"), None);
    }

    #[test]
    fn pong_carries_type_and_timestamp() {
        let reply = ServerReply::Pong {
            timestamp: chrono::Utc::now(),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["type"], "pong");
        assert!(value["timestamp"].is_string());
    }
}
