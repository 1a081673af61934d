use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{Finding, Severity},
};

const FINDING_COLUMNS: &str = "id, scan_id, target_id, service_id, application_id, title, \
                               description, severity, finding_type, details, discovered_at, \
                               verified, fixed, manual";

/// Optional filters for listing findings.
#[derive(Debug, Clone, Default)]
pub struct FindingFilter {
    pub project_id: Option<Uuid>,
    pub severity: Option<Severity>,
    pub finding_type: Option<String>,
    pub fixed: Option<bool>,
}

#[async_trait]
pub trait FindingRepository {
    /// Deduplicating insert: a finding matching an existing one on
    /// `(target_id | service_id | application_id, finding_type, severity)`
    /// merges `details` keep-existing and returns the existing row.
    /// `target_id` must always be set.
    async fn upsert(&self, finding: &Finding) -> Result<Finding, ApiError>;
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Finding>, ApiError>;
    async fn list_by_scan(&self, scan_id: &Uuid) -> Result<Vec<Finding>, ApiError>;
    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<Finding>, ApiError>;
    async fn list_filtered(&self, filter: &FindingFilter) -> Result<Vec<Finding>, ApiError>;
    async fn bulk_update(
        &self,
        ids: &[Uuid],
        fixed: Option<bool>,
        verified: Option<bool>,
    ) -> Result<u64, ApiError>;
    async fn count_by_severity(&self, project_id: &Uuid)
        -> Result<HashMap<String, i64>, ApiError>;
    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;
}

pub struct SqlxFindingRepository {
    pool: DatabasePool,
}

impl SqlxFindingRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FindingRepository for SqlxFindingRepository {
    async fn upsert(&self, finding: &Finding) -> Result<Finding, ApiError> {
        if finding.target_id.is_nil() {
            return Err(ApiError::validation(
                "finding requires a target_id for deduplication",
            ));
        }

        let details = crate::models::ensure_object(&finding.details);

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Finding>(&format!(
            r#"
            SELECT {FINDING_COLUMNS}
            FROM findings
            WHERE finding_type = $1
              AND severity = $2
              AND (target_id = $3
                   OR ($4::uuid IS NOT NULL AND service_id = $4)
                   OR ($5::uuid IS NOT NULL AND application_id = $5))
            LIMIT 1
            "#
        ))
        .bind(&finding.finding_type)
        .bind(finding.severity)
        .bind(finding.target_id)
        .bind(finding.service_id)
        .bind(finding.application_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = if let Some(existing) = existing {
            // Merge details keep-existing; the left operand is the incoming
            // payload so existing keys on the right win.
            let merged = sqlx::query_as::<_, Finding>(&format!(
                r#"
                UPDATE findings
                SET details = $2 || details
                WHERE id = $1
                RETURNING {FINDING_COLUMNS}
                "#
            ))
            .bind(existing.id)
            .bind(&details)
            .fetch_one(&mut *tx)
            .await?;

            merged
        } else {
            sqlx::query_as::<_, Finding>(&format!(
                r#"
                INSERT INTO findings (id, scan_id, target_id, service_id, application_id, title,
                                      description, severity, finding_type, details, discovered_at,
                                      verified, fixed, manual)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                RETURNING {FINDING_COLUMNS}
                "#
            ))
            .bind(finding.id)
            .bind(finding.scan_id)
            .bind(finding.target_id)
            .bind(finding.service_id)
            .bind(finding.application_id)
            .bind(&finding.title)
            .bind(&finding.description)
            .bind(finding.severity)
            .bind(&finding.finding_type)
            .bind(&details)
            .bind(finding.discovered_at)
            .bind(finding.verified)
            .bind(finding.fixed)
            .bind(finding.manual)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;

        Ok(row)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Finding>, ApiError> {
        let result = sqlx::query_as::<_, Finding>(&format!(
            "SELECT {FINDING_COLUMNS} FROM findings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_by_scan(&self, scan_id: &Uuid) -> Result<Vec<Finding>, ApiError> {
        let results = sqlx::query_as::<_, Finding>(&format!(
            r#"
            SELECT {FINDING_COLUMNS}
            FROM findings
            WHERE scan_id = $1
            ORDER BY discovered_at
            "#
        ))
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<Finding>, ApiError> {
        let results = sqlx::query_as::<_, Finding>(&format!(
            r#"
            SELECT {FINDING_COLUMNS}
            FROM findings
            WHERE target_id = $1
            ORDER BY discovered_at
            "#
        ))
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn list_filtered(&self, filter: &FindingFilter) -> Result<Vec<Finding>, ApiError> {
        let results = sqlx::query_as::<_, Finding>(&format!(
            r#"
            SELECT f.{}
            FROM findings f
            JOIN targets t ON t.id = f.target_id
            WHERE ($1::uuid IS NULL OR t.project_id = $1)
              AND ($2::varchar IS NULL OR f.severity = $2)
              AND ($3::varchar IS NULL OR f.finding_type = $3)
              AND ($4::boolean IS NULL OR f.fixed = $4)
            ORDER BY f.discovered_at DESC
            "#,
            FINDING_COLUMNS.replace(", ", ", f.")
        ))
        .bind(filter.project_id)
        .bind(filter.severity)
        .bind(&filter.finding_type)
        .bind(filter.fixed)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn bulk_update(
        &self,
        ids: &[Uuid],
        fixed: Option<bool>,
        verified: Option<bool>,
    ) -> Result<u64, ApiError> {
        if ids.is_empty() || (fixed.is_none() && verified.is_none()) {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE findings
            SET fixed = COALESCE($2, fixed),
                verified = COALESCE($3, verified)
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(fixed)
        .bind(verified)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_by_severity(
        &self,
        project_id: &Uuid,
    ) -> Result<HashMap<String, i64>, ApiError> {
        // Joined through targets rather than scans so findings with a null
        // scan_id (manual entries) are counted too.
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT f.severity, COUNT(*)
            FROM findings f
            JOIN targets t ON t.id = f.target_id
            WHERE t.project_id = $1
            GROUP BY f.severity
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM findings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Finding {} not found", id)));
        }

        Ok(())
    }
}
