use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{Service, ServiceCreate},
    AppState,
};

pub async fn create_service(
    State(state): State<AppState>,
    Json(input): Json<ServiceCreate>,
) -> Result<(StatusCode, Json<Service>), ApiError> {
    if !(1..=65535).contains(&input.port) {
        return Err(ApiError::validation("Port must be between 1 and 65535"));
    }
    if input.protocol.trim().is_empty() {
        return Err(ApiError::validation("Protocol is required"));
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

    let mut service = Service::candidate(
        input.target_id,
        input.port as u16,
        input.protocol.trim(),
    );
    service.service_name = input.service_name.clone();
    service.version = input.version.clone();
    service.title = input.title.clone();
    service.description = input.description.clone();
    service.banner = input.banner.clone();
    service.raw_info = input.raw_info.clone();

    let stored = state.store.services.upsert(&service).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Service>, ApiError> {
    let service = state
        .store
        .services
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Service not found".to_string()))?;
    Ok(Json(service))
}

pub async fn list_target_services(
    State(state): State<AppState>,
    Path(target_id): Path<Uuid>,
) -> Result<Json<Vec<Service>>, ApiError> {
    Ok(Json(state.store.services.list_by_target(&target_id).await?))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.services.delete(&id).await?;
    Ok(Json(serde_json::json!({"message": "Service deleted"})))
}
