//! WebSocket endpoint for dashboard clients.
//!
//! Provides the HTTP upgrade handler, the small client protocol, and the
//! heartbeat task. Connection bookkeeping lives in `pulseboard_events`.

mod handler;
mod heartbeat;
pub mod protocol;

pub use handler::{ws_handler, WsQuery};
pub use heartbeat::start_heartbeat;
