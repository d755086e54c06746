//! API-key authentication extractors for Axum handlers.
//!
//! Keys arrive as `Authorization: Bearer <key>`. Team keys are looked up by
//! their SHA-256 digest; the admin key is compared against configuration.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use pulseboard_core::credentials::{hash_api_key, keys_match};
use pulseboard_core::error::CoreError;
use pulseboard_db::models::team::Team;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// The team whose API key authenticated the request.
///
/// The team's name is remembered by the connection registry so events it
/// triggers reach admin dashboards with `teamName` filled in.
///
/// ```ignore
/// async fn my_handler(TeamAuth(team): TeamAuth) -> AppResult<Json<()>> {
///     tracing::info!(team_id = team.id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TeamAuth(pub Team);

impl FromRequestParts<AppState> for TeamAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = bearer_token(parts)?;
        let team = find_team_by_key(state, key)
            .await?
            .ok_or_else(|| AppError::Core(CoreError::Unauthorized("Invalid API key".into())))?;
        if state.registry.team_name(team.id).await.as_deref() != Some(team.name.as_str()) {
            state.registry.register_team_name(team.id, &team.name).await;
        }
        Ok(TeamAuth(team))
    }
}

/// Requires the admin key. A valid team key is rejected with 403, anything
/// else with 401.
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = bearer_token(parts)?;
        if is_admin_key(state, key) {
            return Ok(RequireAdmin);
        }
        if find_team_by_key(state, key).await?.is_some() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin key required".into(),
            )));
        }
        Err(AppError::Core(CoreError::Unauthorized("Invalid API key".into())))
    }
}

/// Look up the team owning `key`.
pub async fn find_team_by_key(state: &AppState, key: &str) -> AppResult<Option<Team>> {
    Ok(state.teams.find_team_by_key_hash(&hash_api_key(key)).await?)
}

pub fn is_admin_key(state: &AppState, key: &str) -> bool {
    keys_match(key, &state.config.admin_api_key)
}

fn bearer_token(parts: &Parts) -> AppResult<&str> {
    let header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Missing Authorization header".into(),
            ))
        })?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <key>".into(),
            ))
        })
}
