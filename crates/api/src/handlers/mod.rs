pub mod results;
pub mod retry_requests;

use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Serialize an entity into an event payload.
pub(crate) fn event_payload<T: Serialize>(entity: &T) -> AppResult<serde_json::Value> {
    serde_json::to_value(entity)
        .map_err(|e| AppError::InternalError(format!("Failed to encode event payload: {e}")))
}
