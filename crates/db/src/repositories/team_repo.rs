//! Repository for the `teams` table.

use sqlx::PgPool;
use pulseboard_core::types::DbId;

use crate::models::team::Team;

/// Column list for `teams` queries.
const COLUMNS: &str = "id, name, api_key_hash, created_at";

/// Provides lookups for teams.
pub struct TeamRepo;

impl TeamRepo {
    /// Create a team whose API key has already been hashed.
    pub async fn create(pool: &PgPool, name: &str, api_key_hash: &str) -> Result<Team, sqlx::Error> {
        let query = format!(
            "INSERT INTO teams (name, api_key_hash) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Team>(&query)
            .bind(name)
            .bind(api_key_hash)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Team>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM teams WHERE id = $1");
        sqlx::query_as::<_, Team>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Resolve a team from the SHA-256 hex digest of its API key.
    pub async fn find_by_api_key_hash(
        pool: &PgPool,
        api_key_hash: &str,
    ) -> Result<Option<Team>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM teams WHERE api_key_hash = $1");
        sqlx::query_as::<_, Team>(&query)
            .bind(api_key_hash)
            .fetch_optional(pool)
            .await
    }
}
