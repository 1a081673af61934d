use async_trait::async_trait;
use uuid::Uuid;

use crate::{database::DatabasePool, error::ApiError, models::DnsRecord};

const DNS_COLUMNS: &str =
    "id, project_id, scan_id, target_id, record_type, record_value, details, discovered_at";

#[async_trait]
pub trait DnsRecordRepository {
    async fn create(&self, record: &DnsRecord) -> Result<DnsRecord, ApiError>;
    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<DnsRecord>, ApiError>;
    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<DnsRecord>, ApiError>;
    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;
}

pub struct SqlxDnsRecordRepository {
    pool: DatabasePool,
}

impl SqlxDnsRecordRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DnsRecordRepository for SqlxDnsRecordRepository {
    async fn create(&self, record: &DnsRecord) -> Result<DnsRecord, ApiError> {
        let result = sqlx::query_as::<_, DnsRecord>(&format!(
            r#"
            INSERT INTO dns_records (id, project_id, scan_id, target_id, record_type,
                                     record_value, details, discovered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {DNS_COLUMNS}
            "#
        ))
        .bind(record.id)
        .bind(record.project_id)
        .bind(record.scan_id)
        .bind(record.target_id)
        .bind(&record.record_type)
        .bind(&record.record_value)
        .bind(&record.details)
        .bind(record.discovered_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<DnsRecord>, ApiError> {
        let results = sqlx::query_as::<_, DnsRecord>(&format!(
            r#"
            SELECT {DNS_COLUMNS}
            FROM dns_records
            WHERE target_id = $1
            ORDER BY discovered_at
            "#
        ))
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<DnsRecord>, ApiError> {
        let results = sqlx::query_as::<_, DnsRecord>(&format!(
            r#"
            SELECT {DNS_COLUMNS}
            FROM dns_records
            WHERE project_id = $1
            ORDER BY discovered_at
            "#
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM dns_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("DNS record {} not found", id)));
        }

        Ok(())
    }
}
