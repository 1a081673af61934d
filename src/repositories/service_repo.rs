use async_trait::async_trait;
use uuid::Uuid;

use crate::{database::DatabasePool, error::ApiError, models::Service};

const SERVICE_COLUMNS: &str = "id, target_id, port, protocol, service_name, version, title, \
                               description, banner, raw_info, created_at, updated_at";

#[async_trait]
pub trait ServiceRepository {
    /// Insert or merge by natural key `(target_id, port, protocol)`.
    /// Scalar fields fill in only where the existing row is empty; raw_info
    /// merges keep-existing.
    async fn upsert(&self, service: &Service) -> Result<Service, ApiError>;
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Service>, ApiError>;
    async fn find_by_endpoint(
        &self,
        target_id: &Uuid,
        port: i32,
        protocol: &str,
    ) -> Result<Option<Service>, ApiError>;
    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<Service>, ApiError>;
    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Service>, ApiError>;
    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;
}

pub struct SqlxServiceRepository {
    pool: DatabasePool,
}

impl SqlxServiceRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceRepository for SqlxServiceRepository {
    async fn upsert(&self, service: &Service) -> Result<Service, ApiError> {
        let result = sqlx::query_as::<_, Service>(&format!(
            r#"
            INSERT INTO services (id, target_id, port, protocol, service_name, version, title,
                                  description, banner, raw_info, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            ON CONFLICT (target_id, port, protocol) DO UPDATE
            SET service_name = CASE WHEN services.service_name = '' THEN EXCLUDED.service_name
                                    ELSE services.service_name END,
                version      = CASE WHEN services.version = '' THEN EXCLUDED.version
                                    ELSE services.version END,
                title        = CASE WHEN services.title = '' THEN EXCLUDED.title
                                    ELSE services.title END,
                description  = CASE WHEN services.description = '' THEN EXCLUDED.description
                                    ELSE services.description END,
                banner       = CASE WHEN services.banner = '' THEN EXCLUDED.banner
                                    ELSE services.banner END,
                raw_info     = EXCLUDED.raw_info || services.raw_info,
                updated_at   = NOW()
            RETURNING {SERVICE_COLUMNS}
            "#
        ))
        .bind(service.id)
        .bind(service.target_id)
        .bind(service.port)
        .bind(&service.protocol)
        .bind(&service.service_name)
        .bind(&service.version)
        .bind(&service.title)
        .bind(&service.description)
        .bind(&service.banner)
        .bind(crate::models::ensure_object(&service.raw_info))
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Service>, ApiError> {
        let result = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn find_by_endpoint(
        &self,
        target_id: &Uuid,
        port: i32,
        protocol: &str,
    ) -> Result<Option<Service>, ApiError> {
        let result = sqlx::query_as::<_, Service>(&format!(
            r#"
            SELECT {SERVICE_COLUMNS}
            FROM services
            WHERE target_id = $1 AND port = $2 AND protocol = $3
            "#
        ))
        .bind(target_id)
        .bind(port)
        .bind(protocol)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<Service>, ApiError> {
        let results = sqlx::query_as::<_, Service>(&format!(
            r#"
            SELECT {SERVICE_COLUMNS}
            FROM services
            WHERE target_id = $1
            ORDER BY port
            "#
        ))
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Service>, ApiError> {
        let results = sqlx::query_as::<_, Service>(&format!(
            r#"
            SELECT s.{}
            FROM services s
            JOIN targets t ON t.id = s.target_id
            WHERE t.project_id = $1
            ORDER BY s.created_at
            "#,
            SERVICE_COLUMNS.replace(", ", ", s.")
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Service {} not found", id)));
        }

        Ok(())
    }
}
