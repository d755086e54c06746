//! Domain building blocks shared by the Pulseboard API server and the retry
//! watcher.

pub mod channels;
pub mod credentials;
pub mod error;
pub mod event_names;
pub mod retry;
pub mod tasks;
pub mod types;
