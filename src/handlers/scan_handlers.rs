use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{Finding, Scan, ScanConfig, ScanConfigCreate, ScanConfigUpdate, ScanTask, StartScanInput},
    AppState,
};

pub async fn start_scan(
    State(state): State<AppState>,
    Json(input): Json<StartScanInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let scan = state.orchestrator.start_scan(input).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Scan queued successfully",
            "scan_id": scan.id,
        })),
    ))
}

pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.orchestrator.cancel_scan(&id).await?;
    Ok(Json(json!({"message": "Scan cancelled successfully"})))
}

pub async fn list_scans(State(state): State<AppState>) -> Result<Json<Vec<Scan>>, ApiError> {
    Ok(Json(state.store.scans.list().await?))
}

pub async fn get_scan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Scan>, ApiError> {
    let scan = state
        .store
        .scans
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Scan not found".to_string()))?;
    Ok(Json(scan))
}

pub async fn get_scan_findings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Finding>>, ApiError> {
    Ok(Json(state.store.findings.list_by_scan(&id).await?))
}

pub async fn get_scan_tasks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ScanTask>>, ApiError> {
    Ok(Json(state.store.scans.list_tasks(&id).await?))
}

// ----- Scan configurations -----

pub async fn create_scan_config(
    State(state): State<AppState>,
    Json(input): Json<ScanConfigCreate>,
) -> Result<(StatusCode, Json<ScanConfig>), ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Scan config name is required"));
    }
    if input.scanner_type.trim().is_empty() {
        return Err(ApiError::validation("Scanner type is required"));
    }

    let config = state.store.scan_configs.create(&input).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn list_scan_configs(
    State(state): State<AppState>,
) -> Result<Json<Vec<ScanConfig>>, ApiError> {
    Ok(Json(state.store.scan_configs.list().await?))
}

pub async fn get_scan_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScanConfig>, ApiError> {
    let config = state
        .store
        .scan_configs
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Scan configuration not found".to_string()))?;
    Ok(Json(config))
}

pub async fn update_scan_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ScanConfigUpdate>,
) -> Result<Json<ScanConfig>, ApiError> {
    Ok(Json(state.store.scan_configs.update(&id, &update).await?))
}

pub async fn delete_scan_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.scan_configs.delete(&id).await?;
    Ok(Json(json!({"message": "Scan configuration deleted"})))
}
