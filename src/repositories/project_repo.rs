use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{Project, ProjectCreate, ProjectUpdate},
};

#[async_trait]
pub trait ProjectRepository {
    async fn create(&self, input: &ProjectCreate) -> Result<Project, ApiError>;
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Project>, ApiError>;
    async fn list(&self) -> Result<Vec<Project>, ApiError>;
    async fn update(&self, id: &Uuid, update: &ProjectUpdate) -> Result<Project, ApiError>;
    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;
}

pub struct SqlxProjectRepository {
    pool: DatabasePool,
}

impl SqlxProjectRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepository for SqlxProjectRepository {
    async fn create(&self, input: &ProjectCreate) -> Result<Project, ApiError> {
        let result = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            RETURNING id, name, description, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Project>, ApiError> {
        let result = sqlx::query_as::<_, Project>(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list(&self) -> Result<Vec<Project>, ApiError> {
        let results = sqlx::query_as::<_, Project>(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM projects
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn update(&self, id: &Uuid, update: &ProjectUpdate) -> Result<Project, ApiError> {
        let result = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, description, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .fetch_optional(&self.pool)
        .await?;

        result.ok_or_else(|| ApiError::NotFound(format!("Project {} not found", id)))
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Project {} not found", id)));
        }

        Ok(())
    }
}
