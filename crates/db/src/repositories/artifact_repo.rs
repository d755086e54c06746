//! Repository for the `artifacts` table.

use sqlx::PgPool;
use pulseboard_core::types::DbId;

use crate::models::test_result::{Artifact, CreateArtifact};

/// Column list for `artifacts` queries.
const COLUMNS: &str = "id, team_id, result_id, name, content_type, storage_key, created_at";

pub struct ArtifactRepo;

impl ArtifactRepo {
    pub async fn create(
        pool: &PgPool,
        team_id: DbId,
        result_id: DbId,
        input: &CreateArtifact,
    ) -> Result<Artifact, sqlx::Error> {
        let query = format!(
            "INSERT INTO artifacts (team_id, result_id, name, content_type, storage_key) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Artifact>(&query)
            .bind(team_id)
            .bind(result_id)
            .bind(&input.name)
            .bind(&input.content_type)
            .bind(&input.storage_key)
            .fetch_one(pool)
            .await
    }
}
