//! Retry-request lifecycle.
//!
//! A retry request moves through four states:
//!
//! ```text
//! PENDING --(watcher picks up)--> RUNNING --(execution concluded)--> COMPLETED
//!    |
//!    +--(older than the staleness window, sweeper)--> EXPIRED
//! ```
//!
//! `COMPLETED` and `EXPIRED` are terminal. `COMPLETED` means the retry
//! attempt concluded, not that the test passed.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// A PENDING request older than this is considered abandoned.
pub const STALENESS_WINDOW_SECS: i64 = 10 * 60;

/// How often the expiry sweeper runs.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Oldest `requested_at` that still counts as live at `now`.
pub fn stale_cutoff(now: Timestamp) -> Timestamp {
    now - Duration::seconds(STALENESS_WINDOW_SECS)
}

// ---------------------------------------------------------------------------
// RetryStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a retry request.
///
/// Discriminants match the `retry_request_statuses` lookup table.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryStatus {
    Pending = 1,
    Running = 2,
    Completed = 3,
    Expired = 4,
}

impl RetryStatus {
    /// Return the database status ID.
    pub fn id(self) -> i16 {
        self as i16
    }

    /// Map a database status ID back to a status.
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Running),
            3 => Some(Self::Completed),
            4 => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: RetryStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Expired)
                | (Self::Running, Self::Completed)
        )
    }
}

impl fmt::Display for RetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RetryTransition
// ---------------------------------------------------------------------------

/// One legal step of the lifecycle, with the data it records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryTransition {
    /// PENDING -> RUNNING, performed by the watcher.
    PickUp,
    /// RUNNING -> COMPLETED, performed by the watcher whatever the test outcome.
    Complete { result_id: Option<DbId> },
    /// PENDING -> EXPIRED, performed by the expiry sweeper.
    Expire,
}

impl RetryTransition {
    /// Status the request must currently be in.
    pub fn source(self) -> RetryStatus {
        match self {
            Self::PickUp | Self::Expire => RetryStatus::Pending,
            Self::Complete { .. } => RetryStatus::Running,
        }
    }

    /// Status the request ends up in.
    pub fn target(self) -> RetryStatus {
        match self {
            Self::PickUp => RetryStatus::Running,
            Self::Complete { .. } => RetryStatus::Completed,
            Self::Expire => RetryStatus::Expired,
        }
    }

    /// Transition a watcher may request through the API.
    ///
    /// `EXPIRED` belongs to the sweeper and `PENDING` is only ever the
    /// initial state, so neither can be requested.
    pub fn requested_by_watcher(
        target: RetryStatus,
        result_id: Option<DbId>,
    ) -> Result<Self, CoreError> {
        match target {
            RetryStatus::Running => Ok(Self::PickUp),
            RetryStatus::Completed => Ok(Self::Complete { result_id }),
            other => Err(CoreError::Validation(format!(
                "status {other} cannot be set through the API"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RetryRequest
// ---------------------------------------------------------------------------

/// A user's request to re-execute one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub id: DbId,
    pub team_id: DbId,
    pub test_case_id: DbId,
    pub status: RetryStatus,
    pub requested_at: Timestamp,
    pub picked_up_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub result_id: Option<DbId>,
}

impl RetryRequest {
    /// A freshly submitted request.
    pub fn pending(id: DbId, team_id: DbId, test_case_id: DbId, now: Timestamp) -> Self {
        Self {
            id,
            team_id,
            test_case_id,
            status: RetryStatus::Pending,
            requested_at: now,
            picked_up_at: None,
            completed_at: None,
            result_id: None,
        }
    }

    /// PENDING and older than the staleness window at `now`.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        self.status == RetryStatus::Pending && self.requested_at < stale_cutoff(now)
    }

    /// Check that `transition` is legal from the current status.
    pub fn check(&self, transition: RetryTransition) -> Result<(), CoreError> {
        let target = transition.target();
        if self.status != transition.source() || !self.status.can_transition_to(target) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        Ok(())
    }

    /// Apply `transition` at `now`. On error the request is left untouched.
    pub fn apply(&mut self, transition: RetryTransition, now: Timestamp) -> Result<(), CoreError> {
        self.check(transition)?;

        match transition {
            RetryTransition::PickUp => {
                self.picked_up_at = Some(now);
            }
            RetryTransition::Complete { result_id } => {
                self.completed_at = Some(now);
                if result_id.is_some() {
                    self.result_id = result_id;
                }
            }
            RetryTransition::Expire => {
                self.completed_at = Some(now);
            }
        }
        self.status = transition.target();
        Ok(())
    }
}

/// A PENDING request as handed to the watcher, with what it needs to run the
/// test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRetryRequest {
    #[serde(flatten)]
    pub request: RetryRequest,
    pub test_title: String,
    pub file_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    const ALL: [RetryStatus; 4] = [
        RetryStatus::Pending,
        RetryStatus::Running,
        RetryStatus::Completed,
        RetryStatus::Expired,
    ];

    #[test]
    fn only_three_transitions_are_legal() {
        let legal: Vec<_> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            legal,
            vec![
                (RetryStatus::Pending, RetryStatus::Running),
                (RetryStatus::Pending, RetryStatus::Expired),
                (RetryStatus::Running, RetryStatus::Completed),
            ]
        );
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for status in ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(ALL.iter().all(|next| !status.can_transition_to(*next)));
        }
    }

    #[test]
    fn status_ids_round_trip() {
        for status in ALL {
            assert_eq!(RetryStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(RetryStatus::from_id(0), None);
    }

    #[test]
    fn full_watcher_lifecycle_sets_timestamps() {
        let t0 = Utc::now();
        let mut req = RetryRequest::pending(1, 10, 100, t0);

        let t1 = t0 + Duration::seconds(5);
        req.apply(RetryTransition::PickUp, t1).unwrap();
        assert_eq!(req.status, RetryStatus::Running);
        assert_eq!(req.picked_up_at, Some(t1));

        let t2 = t1 + Duration::seconds(30);
        req.apply(RetryTransition::Complete { result_id: Some(77) }, t2)
            .unwrap();
        assert_eq!(req.status, RetryStatus::Completed);
        assert_eq!(req.completed_at, Some(t2));
        assert_eq!(req.result_id, Some(77));
    }

    #[test]
    fn illegal_transition_leaves_request_unchanged() {
        let now = Utc::now();
        let mut req = RetryRequest::pending(1, 10, 100, now);
        req.apply(RetryTransition::PickUp, now).unwrap();
        req.apply(RetryTransition::Complete { result_id: None }, now)
            .unwrap();
        let before = req.clone();

        let err = req.apply(RetryTransition::PickUp, now).unwrap_err();

        assert_matches!(
            err,
            CoreError::InvalidTransition {
                from: RetryStatus::Completed,
                to: RetryStatus::Running
            }
        );
        assert_eq!(req, before);
    }

    #[test]
    fn running_request_cannot_expire() {
        let now = Utc::now();
        let mut req = RetryRequest::pending(1, 10, 100, now);
        req.apply(RetryTransition::PickUp, now).unwrap();

        assert_matches!(
            req.apply(RetryTransition::Expire, now),
            Err(CoreError::InvalidTransition { .. })
        );
        assert_eq!(req.status, RetryStatus::Running);
    }

    #[test]
    fn staleness_uses_ten_minute_window() {
        let t = Utc::now();
        let req = RetryRequest::pending(1, 10, 100, t);

        assert!(!req.is_stale(t + Duration::minutes(9)));
        assert!(!req.is_stale(t + Duration::minutes(10)));
        assert!(req.is_stale(t + Duration::minutes(11)));
    }

    #[test]
    fn watcher_cannot_request_expired_or_pending() {
        assert_matches!(
            RetryTransition::requested_by_watcher(RetryStatus::Expired, None),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            RetryTransition::requested_by_watcher(RetryStatus::Pending, None),
            Err(CoreError::Validation(_))
        );
        assert_eq!(
            RetryTransition::requested_by_watcher(RetryStatus::Completed, Some(3)).unwrap(),
            RetryTransition::Complete { result_id: Some(3) }
        );
    }

    #[test]
    fn status_serializes_in_upper_case() {
        let json = serde_json::to_value(RetryStatus::Running).unwrap();
        assert_eq!(json, "RUNNING");
    }
}
