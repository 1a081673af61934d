use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{
        Application, Certificate, DnsRecord, Finding, Project, ProjectCreate, ProjectUpdate, Scan,
        Service, Target, TargetKind,
    },
    repositories::finding_repo::FindingFilter,
    AppState,
};

pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<ProjectCreate>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Project name is required"));
    }

    let project = state.store.projects.create(&input).await?;

    // Seed initial targets from the request, deduplicated by natural key.
    let seeds = input
        .ip_ranges
        .iter()
        .map(|v| (TargetKind::Ip, v))
        .chain(input.cidr_ranges.iter().map(|v| (TargetKind::Cidr, v)))
        .chain(input.domains.iter().map(|v| (TargetKind::Domain, v)));

    for (kind, value) in seeds {
        if value.trim().is_empty() {
            continue;
        }
        let mut target = Target::candidate(kind, value.trim(), crate::models::empty_object());
        target.project_id = project.id;
        state.store.targets.upsert(&target).await?;
    }

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(state.store.projects.list().await?))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    let project = state
        .store
        .projects
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;
    Ok(Json(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ProjectUpdate>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(state.store.projects.update(&id, &update).await?))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.projects.delete(&id).await?;
    Ok(Json(serde_json::json!({"message": "Project deleted"})))
}

pub async fn list_project_targets(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Target>>, ApiError> {
    Ok(Json(state.store.targets.list_by_project(&id).await?))
}

pub async fn list_project_scans(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Scan>>, ApiError> {
    Ok(Json(state.store.scans.list_by_project(&id).await?))
}

pub async fn list_project_findings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Finding>>, ApiError> {
    let filter = FindingFilter {
        project_id: Some(id),
        ..Default::default()
    };
    Ok(Json(state.store.findings.list_filtered(&filter).await?))
}

pub async fn project_finding_counts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HashMap<String, i64>>, ApiError> {
    Ok(Json(state.store.findings.count_by_severity(&id).await?))
}

pub async fn list_project_services(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Service>>, ApiError> {
    Ok(Json(state.store.services.list_by_project(&id).await?))
}

pub async fn list_project_applications(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Application>>, ApiError> {
    Ok(Json(state.store.applications.list_by_project(&id).await?))
}

pub async fn list_project_dns_records(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DnsRecord>>, ApiError> {
    Ok(Json(state.store.dns_records.list_by_project(&id).await?))
}

pub async fn list_project_certificates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Certificate>>, ApiError> {
    Ok(Json(state.store.certificates.list_by_project(&id).await?))
}
