use async_trait::async_trait;
use uuid::Uuid;

use crate::{database::DatabasePool, error::ApiError, models::Application};

const APPLICATION_COLUMNS: &str = "id, project_id, scan_id, name, app_type, version, description, \
                                   url, host_target, service_id, metadata, created_at, updated_at";

#[async_trait]
pub trait ApplicationRepository {
    async fn create(&self, application: &Application) -> Result<Application, ApiError>;
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Application>, ApiError>;
    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Application>, ApiError>;
    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;
}

pub struct SqlxApplicationRepository {
    pool: DatabasePool,
}

impl SqlxApplicationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationRepository for SqlxApplicationRepository {
    async fn create(&self, application: &Application) -> Result<Application, ApiError> {
        let result = sqlx::query_as::<_, Application>(&format!(
            r#"
            INSERT INTO applications (id, project_id, scan_id, name, app_type, version,
                                      description, url, host_target, service_id, metadata,
                                      created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
            RETURNING {APPLICATION_COLUMNS}
            "#
        ))
        .bind(application.id)
        .bind(application.project_id)
        .bind(application.scan_id)
        .bind(&application.name)
        .bind(&application.app_type)
        .bind(&application.version)
        .bind(&application.description)
        .bind(&application.url)
        .bind(application.host_target)
        .bind(application.service_id)
        .bind(&application.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Application>, ApiError> {
        let result = sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Application>, ApiError> {
        let results = sqlx::query_as::<_, Application>(&format!(
            r#"
            SELECT {APPLICATION_COLUMNS}
            FROM applications
            WHERE project_id = $1
            ORDER BY created_at
            "#
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Application {} not found", id)));
        }

        Ok(())
    }
}
