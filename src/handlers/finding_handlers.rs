use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{BulkFindingUpdate, Finding, FindingCreate, Severity},
    repositories::finding_repo::FindingFilter,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct FindingQuery {
    pub project_id: Option<Uuid>,
    pub severity: Option<Severity>,
    pub finding_type: Option<String>,
    pub fixed: Option<bool>,
}

pub async fn list_findings(
    State(state): State<AppState>,
    Query(query): Query<FindingQuery>,
) -> Result<Json<Vec<Finding>>, ApiError> {
    let filter = FindingFilter {
        project_id: query.project_id,
        severity: query.severity,
        finding_type: query.finding_type,
        fixed: query.fixed,
    };
    Ok(Json(state.store.findings.list_filtered(&filter).await?))
}

pub async fn get_finding(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Finding>, ApiError> {
    let finding = state
        .store
        .findings
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Finding not found".to_string()))?;
    Ok(Json(finding))
}

/// Manual finding entry; deduplicates like scan ingestion does.
pub async fn create_finding(
    State(state): State<AppState>,
    Json(input): Json<FindingCreate>,
) -> Result<(StatusCode, Json<Finding>), ApiError> {
    if input.title.trim().is_empty() {
        return Err(ApiError::validation("Finding title is required"));
    }

    if state
        .store
        .targets
        .get_by_id(&input.target_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Target not found".to_string()));
    }

    let mut finding = Finding::candidate(
        input.title.trim(),
        input.description.clone(),
        input.severity,
        input.finding_type.clone(),
        input.details.clone(),
    );
    finding.target_id = input.target_id;
    finding.scan_id = input.scan_id;
    finding.service_id = input.service_id;
    finding.application_id = input.application_id;
    finding.manual = true;

    let stored = state.store.findings.upsert(&finding).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn bulk_update_findings(
    State(state): State<AppState>,
    Json(input): Json<BulkFindingUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if input.finding_ids.is_empty() {
        return Err(ApiError::validation("finding_ids must not be empty"));
    }

    let updated = state
        .store
        .findings
        .bulk_update(&input.finding_ids, input.fixed, input.verified)
        .await?;

    Ok(Json(json!({"updated": updated})))
}

pub async fn delete_finding(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.findings.delete(&id).await?;
    Ok(Json(json!({"message": "Finding deleted"})))
}
