use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{Target, TargetKind},
};

const TARGET_COLUMNS: &str = "id, project_id, kind, value, metadata, created_at, updated_at";

#[async_trait]
pub trait TargetRepository {
    /// Insert or merge by natural key `(project_id, kind, value)`; metadata
    /// merges keep-existing.
    async fn upsert(&self, target: &Target) -> Result<Target, ApiError>;
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Target>, ApiError>;
    async fn find_by_natural_key(
        &self,
        project_id: &Uuid,
        kind: TargetKind,
        value: &str,
    ) -> Result<Option<Target>, ApiError>;
    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Target>, ApiError>;
    async fn update_metadata(&self, id: &Uuid, metadata: &Value) -> Result<(), ApiError>;
    async fn update_value(&self, id: &Uuid, value: &str) -> Result<Target, ApiError>;
    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;
}

pub struct SqlxTargetRepository {
    pool: DatabasePool,
}

impl SqlxTargetRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepository for SqlxTargetRepository {
    async fn upsert(&self, target: &Target) -> Result<Target, ApiError> {
        // `EXCLUDED.metadata || targets.metadata` keeps existing keys: the
        // right-hand operand of jsonb concatenation wins on conflict.
        let result = sqlx::query_as::<_, Target>(&format!(
            r#"
            INSERT INTO targets (id, project_id, kind, value, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (project_id, kind, value) DO UPDATE
            SET metadata = EXCLUDED.metadata || targets.metadata,
                updated_at = NOW()
            RETURNING {TARGET_COLUMNS}
            "#
        ))
        .bind(target.id)
        .bind(target.project_id)
        .bind(target.kind)
        .bind(&target.value)
        .bind(crate::models::ensure_object(&target.metadata))
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Target>, ApiError> {
        let result = sqlx::query_as::<_, Target>(&format!(
            "SELECT {TARGET_COLUMNS} FROM targets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn find_by_natural_key(
        &self,
        project_id: &Uuid,
        kind: TargetKind,
        value: &str,
    ) -> Result<Option<Target>, ApiError> {
        let result = sqlx::query_as::<_, Target>(&format!(
            r#"
            SELECT {TARGET_COLUMNS}
            FROM targets
            WHERE project_id = $1 AND kind = $2 AND value = $3
            "#
        ))
        .bind(project_id)
        .bind(kind)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Target>, ApiError> {
        let results = sqlx::query_as::<_, Target>(&format!(
            r#"
            SELECT {TARGET_COLUMNS}
            FROM targets
            WHERE project_id = $1
            ORDER BY created_at
            "#
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn update_metadata(&self, id: &Uuid, metadata: &Value) -> Result<(), ApiError> {
        let result =
            sqlx::query("UPDATE targets SET metadata = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(metadata)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Target {} not found", id)));
        }

        Ok(())
    }

    async fn update_value(&self, id: &Uuid, value: &str) -> Result<Target, ApiError> {
        let result = sqlx::query_as::<_, Target>(&format!(
            r#"
            UPDATE targets SET value = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {TARGET_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        result.ok_or_else(|| ApiError::NotFound(format!("Target {} not found", id)))
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM targets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Target {} not found", id)));
        }

        Ok(())
    }
}
