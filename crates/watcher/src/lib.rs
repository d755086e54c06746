//! The retry watcher: a single long-lived process that polls the API for
//! PENDING retry requests and re-runs each test through an external runner.
//!
//! [`RetryWatcher`] owns the poll cycle, [`ApiClient`] talks to the API and
//! [`CommandRunner`] spawns the test runner. The client and runner sit
//! behind traits so the cycle can be exercised without either.

pub mod client;
pub mod config;
pub mod runner;
pub mod watcher;

pub use client::{ApiClient, ClientError, RetryQueue};
pub use config::{ConfigError, WatcherConfig};
pub use runner::{CommandRunner, ExecutionError, TestExecutor, TestOutcome};
pub use watcher::{CycleOutcome, RetryWatcher};
