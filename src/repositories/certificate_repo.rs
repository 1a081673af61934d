use async_trait::async_trait;
use uuid::Uuid;

use crate::{database::DatabasePool, error::ApiError, models::Certificate};

const CERT_COLUMNS: &str = "id, scan_id, target_id, service_id, application_id, issuer, domain, \
                            issued_at, expires_at, details, discovered_at";

#[async_trait]
pub trait CertificateRepository {
    async fn create(&self, certificate: &Certificate) -> Result<Certificate, ApiError>;
    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<Certificate>, ApiError>;
    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Certificate>, ApiError>;
    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;
}

pub struct SqlxCertificateRepository {
    pool: DatabasePool,
}

impl SqlxCertificateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CertificateRepository for SqlxCertificateRepository {
    async fn create(&self, certificate: &Certificate) -> Result<Certificate, ApiError> {
        let result = sqlx::query_as::<_, Certificate>(&format!(
            r#"
            INSERT INTO certificates (id, scan_id, target_id, service_id, application_id,
                                      issuer, domain, issued_at, expires_at, details,
                                      discovered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {CERT_COLUMNS}
            "#
        ))
        .bind(certificate.id)
        .bind(certificate.scan_id)
        .bind(certificate.target_id)
        .bind(certificate.service_id)
        .bind(certificate.application_id)
        .bind(&certificate.issuer)
        .bind(&certificate.domain)
        .bind(certificate.issued_at)
        .bind(certificate.expires_at)
        .bind(&certificate.details)
        .bind(certificate.discovered_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<Certificate>, ApiError> {
        let results = sqlx::query_as::<_, Certificate>(&format!(
            r#"
            SELECT {CERT_COLUMNS}
            FROM certificates
            WHERE target_id = $1
            ORDER BY discovered_at
            "#
        ))
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Certificate>, ApiError> {
        let results = sqlx::query_as::<_, Certificate>(&format!(
            r#"
            SELECT c.{}
            FROM certificates c
            JOIN targets t ON t.id = c.target_id
            WHERE t.project_id = $1
            ORDER BY c.discovered_at
            "#,
            CERT_COLUMNS.replace(", ", ", c.")
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM certificates WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Certificate {} not found", id)));
        }

        Ok(())
    }
}
