//! Repository for the `test_cases` table.

use sqlx::PgPool;
use pulseboard_core::types::DbId;

use crate::models::test_result::TestCase;

/// Column list for `test_cases` queries.
const COLUMNS: &str = "id, team_id, title, file_path, created_at";

pub struct TestCaseRepo;

impl TestCaseRepo {
    /// Return the team's test case with `title`, creating it if needed.
    ///
    /// A later non-null `file_path` replaces the stored one.
    pub async fn upsert(
        pool: &PgPool,
        team_id: DbId,
        title: &str,
        file_path: Option<&str>,
    ) -> Result<TestCase, sqlx::Error> {
        let query = format!(
            "INSERT INTO test_cases (team_id, title, file_path) \
             VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_test_cases_team_title \
             DO UPDATE SET file_path = COALESCE(EXCLUDED.file_path, test_cases.file_path) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TestCase>(&query)
            .bind(team_id)
            .bind(title)
            .bind(file_path)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TestCase>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM test_cases WHERE id = $1");
        sqlx::query_as::<_, TestCase>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
