//! Real-time event distribution.
//!
//! - [`ConnectionRegistry`]: per-instance map of open client connections,
//!   scoped by team or admin.
//! - [`EventBroadcaster`]: the entry point handlers call. Delivers locally
//!   right away and relays through the broker to other instances.
//! - [`PubSubBridge`]: receives relayed events from the broker and hands
//!   them to the local registry only.
//! - [`RedisBridge`]: the Redis publisher/subscriber pair behind the bridge.

pub mod broadcaster;
pub mod connection;
pub mod envelope;
pub mod pubsub;
pub mod registry;

pub use broadcaster::{EventBroadcaster, EventPublisher, PublishError};
pub use connection::{ClientConnection, ConnectionId, ConnectionScope, ConnectionState, Outbound};
pub use envelope::{EventMessage, RelayFrame};
pub use pubsub::{Dispatch, PubSubBridge, RedisBridge};
pub use registry::ConnectionRegistry;
