use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{Target, TargetCreate, TargetRelation, TargetUpdate},
    utils::network::validate_target_value,
    AppState,
};

fn target_from_input(input: &TargetCreate) -> Target {
    let mut target = Target::candidate(input.kind, input.value.trim(), input.metadata.clone());
    target.project_id = input.project_id;
    target
}

pub async fn create_target(
    State(state): State<AppState>,
    Json(input): Json<TargetCreate>,
) -> Result<(StatusCode, Json<Target>), ApiError> {
    if input.value.trim().is_empty() {
        return Err(ApiError::validation("Target value is required"));
    }
    validate_target_value(
        input.kind,
        input.value.trim(),
        state.settings.max_cidr_hosts,
    )?;

    if state
        .store
        .projects
        .get_by_id(&input.project_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Project not found".to_string()));
    }

    let target = state.store.targets.upsert(&target_from_input(&input)).await?;
    Ok((StatusCode::CREATED, Json(target)))
}

pub async fn bulk_create_targets(
    State(state): State<AppState>,
    Json(inputs): Json<Vec<TargetCreate>>,
) -> Result<(StatusCode, Json<Vec<Target>>), ApiError> {
    let mut created = Vec::with_capacity(inputs.len());
    for input in &inputs {
        if input.value.trim().is_empty() {
            continue;
        }
        if let Err(e) = validate_target_value(
            input.kind,
            input.value.trim(),
            state.settings.max_cidr_hosts,
        ) {
            tracing::warn!(value = %input.value, error = %e, "skipping invalid bulk target");
            continue;
        }
        created.push(state.store.targets.upsert(&target_from_input(input)).await?);
    }
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_target(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Target>, ApiError> {
    let target = state
        .store
        .targets
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Target not found".to_string()))?;
    Ok(Json(target))
}

pub async fn update_target(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<TargetUpdate>,
) -> Result<Json<Target>, ApiError> {
    if let Some(metadata) = &update.metadata {
        state.store.targets.update_metadata(&id, metadata).await?;
    }

    let target = match &update.value {
        Some(value) if !value.trim().is_empty() => {
            state.store.targets.update_value(&id, value.trim()).await?
        }
        _ => state
            .store
            .targets
            .get_by_id(&id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Target not found".to_string()))?,
    };

    Ok(Json(target))
}

pub async fn delete_target(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.targets.delete(&id).await?;
    Ok(Json(serde_json::json!({"message": "Target deleted"})))
}

pub async fn list_target_relations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TargetRelation>>, ApiError> {
    Ok(Json(state.store.relations.list_for_target(&id).await?))
}
