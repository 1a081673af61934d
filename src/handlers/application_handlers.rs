use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{Application, ApplicationCreate},
    AppState,
};

pub async fn create_application(
    State(state): State<AppState>,
    Json(input): Json<ApplicationCreate>,
) -> Result<(StatusCode, Json<Application>), ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Application name is required"));
    }
    if state
        .store
        .projects
        .get_by_id(&input.project_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Project not found".to_string()));
    }

    let mut application =
        Application::candidate(input.name.trim(), input.app_type.clone(), input.url.clone());
    application.project_id = input.project_id;
    application.version = input.version.clone();
    application.description = input.description.clone();
    application.host_target = input.host_target;
    application.service_id = input.service_id;
    application.metadata = input.metadata.clone();

    let stored = state.store.applications.create(&application).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Application>, ApiError> {
    let application = state
        .store
        .applications
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Application not found".to_string()))?;
    Ok(Json(application))
}

pub async fn delete_application(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.applications.delete(&id).await?;
    Ok(Json(serde_json::json!({"message": "Application deleted"})))
}
