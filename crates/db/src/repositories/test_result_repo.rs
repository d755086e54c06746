//! Repository for the `test_results` table.

use sqlx::PgPool;
use pulseboard_core::types::{DbId, Timestamp};

use crate::models::test_result::{CreateResult, TestResult};

/// Column list for `test_results` queries.
const COLUMNS: &str = "\
    id, team_id, test_case_id, status_id, duration_ms, \
    error_message, retry_request_id, created_at";

pub struct TestResultRepo;

impl TestResultRepo {
    pub async fn create(
        pool: &PgPool,
        team_id: DbId,
        test_case_id: DbId,
        input: &CreateResult,
    ) -> Result<TestResult, sqlx::Error> {
        let query = format!(
            "INSERT INTO test_results \
                 (team_id, test_case_id, status_id, duration_ms, error_message, retry_request_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TestResult>(&query)
            .bind(team_id)
            .bind(test_case_id)
            .bind(input.status.id())
            .bind(input.duration_ms)
            .bind(&input.error_message)
            .bind(input.retry_request_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TestResult>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM test_results WHERE id = $1");
        sqlx::query_as::<_, TestResult>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Newest result for a test case recorded at or after `since`.
    pub async fn latest_since(
        pool: &PgPool,
        test_case_id: DbId,
        since: Timestamp,
    ) -> Result<Option<TestResult>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM test_results \
             WHERE test_case_id = $1 AND created_at >= $2 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, TestResult>(&query)
            .bind(test_case_id)
            .bind(since)
            .fetch_optional(pool)
            .await
    }

    /// Newest result reported for a retry request.
    pub async fn latest_for_retry(
        pool: &PgPool,
        retry_request_id: DbId,
    ) -> Result<Option<TestResult>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM test_results \
             WHERE retry_request_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, TestResult>(&query)
            .bind(retry_request_id)
            .fetch_optional(pool)
            .await
    }
}
