//! Well-known event names carried in the `event` field of every envelope.
//!
//! Dashboard clients key their behaviour off these strings, so they must stay
//! stable.

/// Sent once to a socket right after it authenticates.
pub const EVENT_CONNECTED: &str = "connected";

/// A test result was recorded.
pub const EVENT_RESULT_NEW: &str = "result:new";

/// A recorded test result has status `FAILED`.
pub const EVENT_RESULT_FAILED: &str = "result:failed";

/// An artifact was attached to a result.
pub const EVENT_ARTIFACT_NEW: &str = "artifact:new";

/// A user asked for a test to be re-executed.
pub const EVENT_RETRY_REQUESTED: &str = "retry:requested";

/// The watcher moved a retry request to a new status.
pub const EVENT_RETRY_UPDATED: &str = "retry:updated";

/// The expiry sweeper gave up on a stale retry request.
pub const EVENT_RETRY_EXPIRED: &str = "retry:expired";
