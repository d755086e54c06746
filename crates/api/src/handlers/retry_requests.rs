//! Handlers for retry requests.
//!
//! Dashboards create requests; the retry watcher lists pending ones and
//! drives them through RUNNING to COMPLETED. Every change is broadcast to
//! the owning team and to admins.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use pulseboard_core::error::CoreError;
use pulseboard_core::event_names::{EVENT_RETRY_REQUESTED, EVENT_RETRY_UPDATED};
use pulseboard_core::retry::{PendingRetryRequest, RetryRequest, RetryTransition};
use pulseboard_core::types::DbId;
use pulseboard_db::models::retry_request::{
    CreateRetryRequest, RetryRequestListQuery, UpdateRetryStatus,
};
use pulseboard_db::models::team::Team;

use super::event_payload;
use crate::error::AppResult;
use crate::middleware::auth::{RequireAdmin, TeamAuth};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load a retry request owned by `team`. Other teams' requests are reported
/// as not found.
async fn find_owned(state: &AppState, team: &Team, id: DbId) -> AppResult<RetryRequest> {
    state
        .retries
        .find_retry(id)
        .await?
        .filter(|request| request.team_id == team.id)
        .ok_or_else(|| {
            CoreError::NotFound {
                entity: "RetryRequest",
                id,
            }
            .into()
        })
}

/// The result to link when the watcher completes without naming one: the
/// newest result reported with this request's id, else the newest result of
/// the test case recorded since pickup.
async fn result_for_completion(
    state: &AppState,
    request: &RetryRequest,
) -> AppResult<Option<DbId>> {
    if let Some(result) = state.results.latest_result_for_retry(request.id).await? {
        return Ok(Some(result.id));
    }
    let Some(picked_up_at) = request.picked_up_at else {
        return Ok(None);
    };
    let latest = state
        .results
        .latest_result_since(request.test_case_id, picked_up_at)
        .await?;
    Ok(latest.map(|result| result.id))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/retry-requests
pub async fn create_retry_request(
    TeamAuth(team): TeamAuth,
    State(state): State<AppState>,
    Json(input): Json<CreateRetryRequest>,
) -> AppResult<impl IntoResponse> {
    let test_case = state
        .results
        .find_test_case(input.test_case_id)
        .await?
        .filter(|tc| tc.team_id == team.id)
        .ok_or(CoreError::NotFound {
            entity: "TestCase",
            id: input.test_case_id,
        })?;

    let request = state
        .retries
        .create_retry(team.id, test_case.id, Utc::now())
        .await?;

    tracing::info!(
        retry_request_id = request.id,
        team_id = team.id,
        test_case_id = test_case.id,
        "Retry requested",
    );

    let created = PendingRetryRequest {
        request,
        test_title: test_case.title,
        file_path: test_case.file_path,
    };
    state
        .broadcaster
        .broadcast_with_admin(team.id, EVENT_RETRY_REQUESTED, event_payload(&created)?)
        .await;

    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// GET /api/v1/retry-requests/pending
///
/// PENDING requests of the caller's team, oldest first. Requests already
/// past the staleness window are left out even before the sweeper runs.
pub async fn list_pending(
    TeamAuth(team): TeamAuth,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let pending = state.retries.list_pending(team.id, Utc::now()).await?;
    Ok(Json(DataResponse { data: pending }))
}

/// GET /api/v1/retry-requests/{id}
pub async fn get_retry_request(
    TeamAuth(team): TeamAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let request = find_owned(&state, &team, id).await?;
    Ok(Json(DataResponse { data: request }))
}

/// PATCH /api/v1/retry-requests/{id}
///
/// Accepts `RUNNING` (pickup) and `COMPLETED`. `PENDING` and `EXPIRED`
/// cannot be requested; an illegal step for the current status is a 409.
pub async fn update_retry_request(
    TeamAuth(team): TeamAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateRetryStatus>,
) -> AppResult<impl IntoResponse> {
    let transition = RetryTransition::requested_by_watcher(input.status, input.result_id)?;
    let current = find_owned(&state, &team, id).await?;

    let transition = match transition {
        RetryTransition::Complete { result_id: Some(result_id) } => {
            state
                .results
                .find_result(result_id)
                .await?
                .filter(|result| result.team_id == team.id)
                .ok_or_else(|| {
                    CoreError::Validation(format!("resultId {result_id} does not exist"))
                })?;
            transition
        }
        RetryTransition::Complete { result_id: None } => RetryTransition::Complete {
            result_id: result_for_completion(&state, &current).await?,
        },
        other => other,
    };

    let updated = state.retries.transition(id, transition, Utc::now()).await?;

    tracing::info!(
        retry_request_id = id,
        team_id = team.id,
        status = %updated.status,
        result_id = ?updated.result_id,
        "Retry request updated",
    );

    state
        .broadcaster
        .broadcast_with_admin(team.id, EVENT_RETRY_UPDATED, event_payload(&updated)?)
        .await;

    Ok(Json(DataResponse { data: updated }))
}

/// GET /api/v1/admin/retry-requests
///
/// Requests of all teams, newest first, optionally filtered by status.
pub async fn list_all_retry_requests(
    _admin: RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<RetryRequestListQuery>,
) -> AppResult<impl IntoResponse> {
    let requests = state.retries.list_all(&params).await?;
    Ok(Json(DataResponse { data: requests }))
}
