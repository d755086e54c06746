//! Wire formats for events.

use pulseboard_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// The envelope every client receives:
/// `{"event": "...", "data": {...}, "timestamp": "<ISO-8601>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl EventMessage {
    pub fn new(event: &str, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            data,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// What travels over the broker: the client envelope with one extra
/// top-level `origin` field naming the instance that published it.
///
/// Bodies without `origin` are plain envelopes and are delivered as-is. The
/// field never reaches clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(flatten)]
    pub message: EventMessage,
}

impl RelayFrame {
    pub fn new(origin: &str, message: EventMessage) -> Self {
        Self {
            origin: Some(origin.to_string()),
            message,
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_has_three_fields() {
        let msg = EventMessage::new("retry:requested", json!({"id": 1}));
        let value: serde_json::Value = serde_json::from_str(&msg.to_text().unwrap()).unwrap();

        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(value["event"], "retry:requested");
        assert_eq!(value["data"]["id"], 1);
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn relay_frame_is_the_envelope_plus_origin() {
        let msg = EventMessage::new("result:new", json!({"teamId": 2}));
        let text = RelayFrame::new("node-a", msg.clone()).to_text().unwrap();

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["origin"], "node-a");
        assert_eq!(value["event"], "result:new");
        assert_eq!(value["data"]["teamId"], 2);

        let back = RelayFrame::parse(&text).unwrap();
        assert_eq!(back.origin.as_deref(), Some("node-a"));
        assert_eq!(back.message, msg);
    }

    #[test]
    fn plain_envelope_parses_without_origin() {
        let plain = r#"{"event":"a","data":{},"timestamp":"2026-01-01T00:00:00Z"}"#;

        let frame = RelayFrame::parse(plain).unwrap();

        assert!(frame.origin.is_none());
        assert_eq!(frame.message.event, "a");
        let delivered: serde_json::Value =
            serde_json::from_str(&frame.message.to_text().unwrap()).unwrap();
        assert!(delivered.get("origin").is_none());
    }
}
