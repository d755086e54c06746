//! Team entity.

use pulseboard_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `teams` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: DbId,
    pub name: String,
    #[serde(skip_serializing)]
    pub api_key_hash: String,
    pub created_at: Timestamp,
}
