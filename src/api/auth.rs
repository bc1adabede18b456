// src/api/auth.rs — Bearer token check for API requests

use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::api::types::ErrorResponse;
use crate::api::ApiState;

/// When a token is configured, every request must carry it as
/// `Authorization: Bearer <token>`. Without a configured token the API
/// is open (local-only binding).
pub fn check_auth(
    state: &ApiState,
    headers: &HeaderMap,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let Some(expected) = &state.token else {
        return Ok(());
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Missing or invalid API token".into(),
            }),
        ))
    }
}
