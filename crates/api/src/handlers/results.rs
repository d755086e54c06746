//! Handlers for test results and their artifacts.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use pulseboard_core::error::CoreError;
use pulseboard_core::event_names::{EVENT_ARTIFACT_NEW, EVENT_RESULT_FAILED, EVENT_RESULT_NEW};
use pulseboard_core::types::DbId;
use pulseboard_db::models::test_result::{
    CreateArtifact, CreateResult, ResultStatus, TestResult,
};
use serde::Serialize;

use super::event_payload;
use crate::error::AppResult;
use crate::middleware::auth::TeamAuth;
use crate::response::DataResponse;
use crate::state::AppState;

/// A stored result together with its test title, as returned and broadcast.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultResponse {
    #[serde(flatten)]
    pub result: TestResult,
    pub test_title: String,
}

/// POST /api/v1/results
///
/// Records one test execution. The test case is created the first time its
/// title is seen. Broadcasts `result:new`, and `result:failed` as well for
/// failures.
pub async fn create_result(
    TeamAuth(team): TeamAuth,
    State(state): State<AppState>,
    Json(input): Json<CreateResult>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    if let Some(retry_id) = input.retry_request_id {
        let owned = state
            .retries
            .find_retry(retry_id)
            .await?
            .is_some_and(|request| request.team_id == team.id);
        if !owned {
            return Err(CoreError::Validation(format!(
                "retryRequestId {retry_id} does not exist"
            ))
            .into());
        }
    }

    let test_case = state
        .results
        .upsert_test_case(team.id, input.test_title.trim(), input.file_path.as_deref())
        .await?;
    let result = state
        .results
        .create_result(team.id, test_case.id, &input)
        .await?;

    tracing::info!(
        result_id = result.id,
        team_id = team.id,
        test_case_id = test_case.id,
        status = ?result.status,
        "Test result recorded",
    );

    let failed = result.status == ResultStatus::Failed;
    let response = ResultResponse {
        result,
        test_title: test_case.title,
    };
    let payload = event_payload(&response)?;
    state
        .broadcaster
        .broadcast_with_admin(team.id, EVENT_RESULT_NEW, payload.clone())
        .await;
    if failed {
        state
            .broadcaster
            .broadcast_with_admin(team.id, EVENT_RESULT_FAILED, payload)
            .await;
    }

    Ok((StatusCode::CREATED, Json(DataResponse { data: response })))
}

/// POST /api/v1/results/{id}/artifacts
///
/// Registers an artifact already uploaded to object storage.
pub async fn create_artifact(
    TeamAuth(team): TeamAuth,
    State(state): State<AppState>,
    Path(result_id): Path<DbId>,
    Json(input): Json<CreateArtifact>,
) -> AppResult<impl IntoResponse> {
    let result = state
        .results
        .find_result(result_id)
        .await?
        .filter(|result| result.team_id == team.id)
        .ok_or(CoreError::NotFound {
            entity: "TestResult",
            id: result_id,
        })?;
    input.validate()?;

    let artifact = state
        .results
        .create_artifact(team.id, result.id, &input)
        .await?;

    tracing::info!(
        artifact_id = artifact.id,
        result_id = result.id,
        team_id = team.id,
        "Artifact registered",
    );

    state
        .broadcaster
        .broadcast_with_admin(team.id, EVENT_ARTIFACT_NEW, event_payload(&artifact)?)
        .await;

    Ok((StatusCode::CREATED, Json(DataResponse { data: artifact })))
}
