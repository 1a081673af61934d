use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{RelationKind, TargetRelation},
};

const RELATION_COLUMNS: &str = "id, source_id, destination_id, kind, metadata, created_at";

#[async_trait]
pub trait RelationRepository {
    /// Insert or merge by natural key `(source_id, destination_id, kind)`.
    /// Both endpoints must exist; a missing endpoint surfaces as a
    /// `NotFound` so ingestion can drop the relation with a warning.
    async fn upsert(&self, relation: &TargetRelation) -> Result<TargetRelation, ApiError>;
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<TargetRelation>, ApiError>;
    async fn list_for_target(&self, target_id: &Uuid) -> Result<Vec<TargetRelation>, ApiError>;
    async fn list_filtered(
        &self,
        source_id: Option<Uuid>,
        destination_id: Option<Uuid>,
        kind: Option<RelationKind>,
    ) -> Result<Vec<TargetRelation>, ApiError>;
    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;
}

pub struct SqlxRelationRepository {
    pool: DatabasePool,
}

impl SqlxRelationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RelationRepository for SqlxRelationRepository {
    async fn upsert(&self, relation: &TargetRelation) -> Result<TargetRelation, ApiError> {
        let result = sqlx::query_as::<_, TargetRelation>(&format!(
            r#"
            INSERT INTO target_relations (id, source_id, destination_id, kind, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (source_id, destination_id, kind) DO UPDATE
            SET metadata = EXCLUDED.metadata || target_relations.metadata
            RETURNING {RELATION_COLUMNS}
            "#
        ))
        .bind(relation.id)
        .bind(relation.source_id)
        .bind(relation.destination_id)
        .bind(relation.kind)
        .bind(crate::models::ensure_object(&relation.metadata))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => ApiError::NotFound(
                format!(
                    "Relation endpoint missing: {} -> {}",
                    relation.source_id, relation.destination_id
                ),
            ),
            _ => ApiError::Database(e),
        })?;

        Ok(result)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<TargetRelation>, ApiError> {
        let result = sqlx::query_as::<_, TargetRelation>(&format!(
            "SELECT {RELATION_COLUMNS} FROM target_relations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_for_target(&self, target_id: &Uuid) -> Result<Vec<TargetRelation>, ApiError> {
        let results = sqlx::query_as::<_, TargetRelation>(&format!(
            r#"
            SELECT {RELATION_COLUMNS}
            FROM target_relations
            WHERE source_id = $1 OR destination_id = $1
            ORDER BY created_at
            "#
        ))
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn list_filtered(
        &self,
        source_id: Option<Uuid>,
        destination_id: Option<Uuid>,
        kind: Option<RelationKind>,
    ) -> Result<Vec<TargetRelation>, ApiError> {
        let results = sqlx::query_as::<_, TargetRelation>(&format!(
            r#"
            SELECT {RELATION_COLUMNS}
            FROM target_relations
            WHERE ($1::uuid IS NULL OR source_id = $1)
              AND ($2::uuid IS NULL OR destination_id = $2)
              AND ($3::varchar IS NULL OR kind = $3)
            ORDER BY created_at
            "#
        ))
        .bind(source_id)
        .bind(destination_id)
        .bind(kind)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM target_relations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Relation {} not found", id)));
        }

        Ok(())
    }
}
