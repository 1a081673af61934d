use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::{error::ApiError, AppState};

pub async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if let Some(pool) = &state.pool {
        crate::database::health_check(pool).await?;
    }

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
