//! Test cases, test results and artifacts.

use pulseboard_core::error::CoreError;
use pulseboard_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Longest accepted test title.
pub const MAX_TITLE_LEN: usize = 500;

// ---------------------------------------------------------------------------
// ResultStatus
// ---------------------------------------------------------------------------

/// Outcome of one test execution. Discriminants match `test_result_statuses`.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    Passed = 1,
    Failed = 2,
    Skipped = 3,
}

impl ResultStatus {
    pub fn id(self) -> i16 {
        self as i16
    }
}

/// A status id with no matching variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown test result status id {0}")]
pub struct UnknownResultStatus(pub i16);

impl TryFrom<i16> for ResultStatus {
    type Error = UnknownResultStatus;

    fn try_from(id: i16) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(Self::Passed),
            2 => Ok(Self::Failed),
            3 => Ok(Self::Skipped),
            other => Err(UnknownResultStatus(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A row from the `test_cases` table. Unique per `(team_id, title)`.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: DbId,
    pub team_id: DbId,
    pub title: String,
    pub file_path: Option<String>,
    pub created_at: Timestamp,
}

/// A row from the `test_results` table.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: DbId,
    pub team_id: DbId,
    pub test_case_id: DbId,
    #[sqlx(rename = "status_id", try_from = "i16")]
    pub status: ResultStatus,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub retry_request_id: Option<DbId>,
    pub created_at: Timestamp,
}

/// A row from the `artifacts` table. The bytes live in object storage under
/// `storage_key`.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: DbId,
    pub team_id: DbId,
    pub result_id: DbId,
    pub name: String,
    pub content_type: String,
    pub storage_key: String,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// DTO for `POST /api/v1/results`. The test case is created on first sight
/// of its title.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResult {
    pub test_title: String,
    pub file_path: Option<String>,
    pub status: ResultStatus,
    #[serde(default)]
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub retry_request_id: Option<DbId>,
}

impl CreateResult {
    pub fn validate(&self) -> Result<(), CoreError> {
        let title = self.test_title.trim();
        if title.is_empty() {
            return Err(CoreError::Validation("testTitle must not be empty".into()));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(CoreError::Validation(format!(
                "testTitle must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        if self.duration_ms < 0 {
            return Err(CoreError::Validation("durationMs must not be negative".into()));
        }
        Ok(())
    }
}

/// DTO for `POST /api/v1/results/{id}/artifacts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArtifact {
    pub name: String,
    pub content_type: String,
    pub storage_key: String,
}

impl CreateArtifact {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() || self.storage_key.trim().is_empty() {
            return Err(CoreError::Validation(
                "name and storageKey must not be empty".into(),
            ));
        }
        Ok(())
    }
}
