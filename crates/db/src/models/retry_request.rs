//! Retry request rows and DTOs.

use pulseboard_core::error::CoreError;
use pulseboard_core::retry::{PendingRetryRequest, RetryRequest, RetryStatus};
use pulseboard_core::types::{DbId, Timestamp};
use serde::Deserialize;
use sqlx::FromRow;

/// Maximum page size for the cross-team listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for the cross-team listing.
pub const DEFAULT_LIMIT: i64 = 50;

/// A row from the `retry_requests` table.
#[derive(Debug, Clone, FromRow)]
pub struct RetryRequestRow {
    pub id: DbId,
    pub team_id: DbId,
    pub test_case_id: DbId,
    pub status_id: i16,
    pub requested_at: Timestamp,
    pub picked_up_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub result_id: Option<DbId>,
}

impl TryFrom<RetryRequestRow> for RetryRequest {
    type Error = CoreError;

    fn try_from(row: RetryRequestRow) -> Result<Self, Self::Error> {
        let status = RetryStatus::from_id(row.status_id).ok_or_else(|| {
            CoreError::Internal(format!("unknown retry status id {}", row.status_id))
        })?;

        Ok(RetryRequest {
            id: row.id,
            team_id: row.team_id,
            test_case_id: row.test_case_id,
            status,
            requested_at: row.requested_at,
            picked_up_at: row.picked_up_at,
            completed_at: row.completed_at,
            result_id: row.result_id,
        })
    }
}

/// A pending retry request joined with its test case.
#[derive(Debug, Clone, FromRow)]
pub struct PendingRetryRow {
    #[sqlx(flatten)]
    pub request: RetryRequestRow,
    pub test_title: String,
    pub file_path: Option<String>,
}

impl TryFrom<PendingRetryRow> for PendingRetryRequest {
    type Error = CoreError;

    fn try_from(row: PendingRetryRow) -> Result<Self, Self::Error> {
        Ok(PendingRetryRequest {
            request: row.request.try_into()?,
            test_title: row.test_title,
            file_path: row.file_path,
        })
    }
}

/// DTO for `POST /api/v1/retry-requests`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRetryRequest {
    pub test_case_id: DbId,
}

/// DTO for `PATCH /api/v1/retry-requests/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRetryStatus {
    pub status: RetryStatus,
    pub result_id: Option<DbId>,
}

/// Query parameters for `GET /api/v1/admin/retry-requests`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryRequestListQuery {
    /// Only return requests in this status.
    pub status: Option<RetryStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl RetryRequestListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
