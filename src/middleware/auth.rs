use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::{error::ApiError, AppState};

/// Bearer-token authentication against the sessions table.
///
/// Requests without a valid, unexpired session token are rejected with 401.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::authentication("Missing bearer token"))?;

    let session = state
        .sessions
        .find_by_token(token)
        .await?
        .ok_or_else(|| ApiError::authentication("Invalid session token"))?;

    if session.is_expired(Utc::now()) {
        return Err(ApiError::authentication("Session expired"));
    }

    Ok(next.run(request).await)
}
