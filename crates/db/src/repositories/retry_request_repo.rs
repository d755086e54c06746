//! Repository for the `retry_requests` table.
//!
//! Status changes are conditional on the expected current status so two
//! writers can never silently overwrite each other.

use pulseboard_core::retry::{RetryRequest, RetryStatus};
use pulseboard_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::retry_request::{PendingRetryRow, RetryRequestListQuery, RetryRequestRow};

/// Column list for `retry_requests` queries.
const COLUMNS: &str = "\
    id, team_id, test_case_id, status_id, requested_at, \
    picked_up_at, completed_at, result_id";

pub struct RetryRequestRepo;

impl RetryRequestRepo {
    /// Insert a new PENDING request.
    pub async fn create(
        pool: &PgPool,
        team_id: DbId,
        test_case_id: DbId,
        requested_at: Timestamp,
    ) -> Result<RetryRequestRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO retry_requests (team_id, test_case_id, status_id, requested_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetryRequestRow>(&query)
            .bind(team_id)
            .bind(test_case_id)
            .bind(RetryStatus::Pending.id())
            .bind(requested_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<RetryRequestRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM retry_requests WHERE id = $1");
        sqlx::query_as::<_, RetryRequestRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// PENDING requests of a team requested at or after `cutoff`, oldest
    /// first, joined with their test case.
    pub async fn list_pending(
        pool: &PgPool,
        team_id: DbId,
        cutoff: Timestamp,
    ) -> Result<Vec<PendingRetryRow>, sqlx::Error> {
        sqlx::query_as::<_, PendingRetryRow>(
            "SELECT r.id, r.team_id, r.test_case_id, r.status_id, r.requested_at, \
                    r.picked_up_at, r.completed_at, r.result_id, \
                    tc.title AS test_title, tc.file_path \
             FROM retry_requests r \
             JOIN test_cases tc ON tc.id = r.test_case_id \
             WHERE r.team_id = $1 AND r.status_id = $2 AND r.requested_at >= $3 \
             ORDER BY r.requested_at ASC, r.id ASC",
        )
        .bind(team_id)
        .bind(RetryStatus::Pending.id())
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }

    /// Write `next` over the row, but only if the row is still in `expected`.
    ///
    /// Returns `None` when the row was changed (or removed) concurrently.
    pub async fn update_if_status(
        pool: &PgPool,
        expected: RetryStatus,
        next: &RetryRequest,
    ) -> Result<Option<RetryRequestRow>, sqlx::Error> {
        let query = format!(
            "UPDATE retry_requests \
             SET status_id = $3, picked_up_at = $4, completed_at = $5, result_id = $6 \
             WHERE id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetryRequestRow>(&query)
            .bind(next.id)
            .bind(expected.id())
            .bind(next.status.id())
            .bind(next.picked_up_at)
            .bind(next.completed_at)
            .bind(next.result_id)
            .fetch_optional(pool)
            .await
    }

    /// Move every PENDING request requested before `cutoff` to EXPIRED.
    pub async fn expire_older_than(
        pool: &PgPool,
        cutoff: Timestamp,
        now: Timestamp,
    ) -> Result<Vec<RetryRequestRow>, sqlx::Error> {
        let query = format!(
            "UPDATE retry_requests \
             SET status_id = $1, completed_at = $2 \
             WHERE status_id = $3 AND requested_at < $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetryRequestRow>(&query)
            .bind(RetryStatus::Expired.id())
            .bind(now)
            .bind(RetryStatus::Pending.id())
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    /// Page through requests across all teams, newest first.
    pub async fn list_all(
        pool: &PgPool,
        params: &RetryRequestListQuery,
    ) -> Result<Vec<RetryRequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM retry_requests \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1) \
             ORDER BY requested_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, RetryRequestRow>(&query)
            .bind(params.status.map(RetryStatus::id))
            .bind(params.limit())
            .bind(params.offset())
            .fetch_all(pool)
            .await
    }
}
