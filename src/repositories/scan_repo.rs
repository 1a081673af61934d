use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    database::DatabasePool,
    error::ApiError,
    models::{Scan, ScanConfig, ScanConfigCreate, ScanConfigUpdate, ScanStatus, ScanTask},
};

const SCAN_COLUMNS: &str = "id, project_id, scan_config_id, status, started_at, completed_at, \
                            raw_results, error, created_at";

const CONFIG_COLUMNS: &str = "id, name, scanner_type, parameters, active, created_at";

const TASK_COLUMNS: &str = "id, scan_id, task_type, parameters, status, result, created_at, \
                            updated_at";

#[async_trait]
pub trait ScanRepository {
    async fn create(&self, project_id: &Uuid, scan_config_id: &Uuid) -> Result<Scan, ApiError>;
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Scan>, ApiError>;
    async fn list(&self) -> Result<Vec<Scan>, ApiError>;
    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Scan>, ApiError>;

    /// Compare-and-set status update honoring the scan state machine: the
    /// write applies only while the current status permits the transition
    /// (terminal states are never overwritten). On entering `running`,
    /// `started_at` is set if absent; on entering a terminal state,
    /// `completed_at` is set if absent. A failure message lands in `error`;
    /// a completion message lands in `raw_results.summary`.
    ///
    /// Returns whether the write was applied.
    async fn update_status(
        &self,
        id: &Uuid,
        status: ScanStatus,
        message: &str,
    ) -> Result<bool, ApiError>;

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;

    async fn create_task(&self, task: &ScanTask) -> Result<ScanTask, ApiError>;
    async fn list_tasks(&self, scan_id: &Uuid) -> Result<Vec<ScanTask>, ApiError>;
    async fn update_task_status(
        &self,
        task_id: &Uuid,
        status: ScanStatus,
        result: Option<Value>,
    ) -> Result<(), ApiError>;
}

#[async_trait]
pub trait ScanConfigRepository {
    async fn create(&self, input: &ScanConfigCreate) -> Result<ScanConfig, ApiError>;
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<ScanConfig>, ApiError>;
    async fn list(&self) -> Result<Vec<ScanConfig>, ApiError>;
    async fn update(&self, id: &Uuid, update: &ScanConfigUpdate) -> Result<ScanConfig, ApiError>;
    async fn delete(&self, id: &Uuid) -> Result<(), ApiError>;
}

pub struct SqlxScanRepository {
    pool: DatabasePool,
}

impl SqlxScanRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanRepository for SqlxScanRepository {
    async fn create(&self, project_id: &Uuid, scan_config_id: &Uuid) -> Result<Scan, ApiError> {
        let result = sqlx::query_as::<_, Scan>(&format!(
            r#"
            INSERT INTO scans (id, project_id, scan_config_id, status, created_at)
            VALUES ($1, $2, $3, 'pending', NOW())
            RETURNING {SCAN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(scan_config_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Scan>, ApiError> {
        let result = sqlx::query_as::<_, Scan>(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list(&self) -> Result<Vec<Scan>, ApiError> {
        let results = sqlx::query_as::<_, Scan>(&format!(
            "SELECT {SCAN_COLUMNS} FROM scans ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Scan>, ApiError> {
        let results = sqlx::query_as::<_, Scan>(&format!(
            r#"
            SELECT {SCAN_COLUMNS}
            FROM scans
            WHERE project_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn update_status(
        &self,
        id: &Uuid,
        status: ScanStatus,
        message: &str,
    ) -> Result<bool, ApiError> {
        // Allowed current states for this transition; same-state writes are
        // permitted for repeated `running` progress updates.
        let allowed_from: &[&str] = match status {
            ScanStatus::Pending => &[],
            ScanStatus::Running => &["pending", "running"],
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled => {
                &["pending", "running"]
            }
        };

        if allowed_from.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE scans
            SET status = $2,
                started_at = CASE WHEN $2 = 'running'
                                  THEN COALESCE(started_at, NOW())
                                  ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed', 'cancelled')
                                    THEN COALESCE(completed_at, NOW())
                                    ELSE completed_at END,
                error = CASE WHEN $2 = 'failed' THEN $3 ELSE error END,
                raw_results = CASE WHEN $2 = 'completed'
                                   THEN jsonb_build_object('summary', $3::text)
                                   ELSE raw_results END
            WHERE id = $1 AND status = ANY($4)
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(message)
        .bind(allowed_from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM scans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Scan {} not found", id)));
        }

        Ok(())
    }

    async fn create_task(&self, task: &ScanTask) -> Result<ScanTask, ApiError> {
        let result = sqlx::query_as::<_, ScanTask>(&format!(
            r#"
            INSERT INTO scan_tasks (id, scan_id, task_type, parameters, status, result,
                                    created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task.id)
        .bind(task.scan_id)
        .bind(&task.task_type)
        .bind(&task.parameters)
        .bind(task.status)
        .bind(&task.result)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list_tasks(&self, scan_id: &Uuid) -> Result<Vec<ScanTask>, ApiError> {
        let results = sqlx::query_as::<_, ScanTask>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM scan_tasks
            WHERE scan_id = $1
            ORDER BY created_at
            "#
        ))
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn update_task_status(
        &self,
        task_id: &Uuid,
        status: ScanStatus,
        result: Option<Value>,
    ) -> Result<(), ApiError> {
        let outcome = sqlx::query(
            r#"
            UPDATE scan_tasks
            SET status = $2,
                result = COALESCE($3, result),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(task_id)
        .bind(status)
        .bind(result)
        .execute(&self.pool)
        .await?;

        if outcome.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Scan task {} not found", task_id)));
        }

        Ok(())
    }
}

pub struct SqlxScanConfigRepository {
    pool: DatabasePool,
}

impl SqlxScanConfigRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanConfigRepository for SqlxScanConfigRepository {
    async fn create(&self, input: &ScanConfigCreate) -> Result<ScanConfig, ApiError> {
        let result = sqlx::query_as::<_, ScanConfig>(&format!(
            r#"
            INSERT INTO scan_configs (id, name, scanner_type, parameters, active, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING {CONFIG_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.scanner_type)
        .bind(&input.parameters)
        .bind(input.active)
        .fetch_one(&self.pool)
        .await?;

        Ok(result)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<ScanConfig>, ApiError> {
        let result = sqlx::query_as::<_, ScanConfig>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM scan_configs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn list(&self) -> Result<Vec<ScanConfig>, ApiError> {
        let results = sqlx::query_as::<_, ScanConfig>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM scan_configs ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(results)
    }

    async fn update(&self, id: &Uuid, update: &ScanConfigUpdate) -> Result<ScanConfig, ApiError> {
        let result = sqlx::query_as::<_, ScanConfig>(&format!(
            r#"
            UPDATE scan_configs
            SET name = COALESCE($2, name),
                scanner_type = COALESCE($3, scanner_type),
                parameters = COALESCE($4, parameters),
                active = COALESCE($5, active)
            WHERE id = $1
            RETURNING {CONFIG_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.scanner_type)
        .bind(&update.parameters)
        .bind(update.active)
        .fetch_optional(&self.pool)
        .await?;

        result.ok_or_else(|| ApiError::NotFound(format!("Scan config {} not found", id)))
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM scan_configs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Scan config {} not found", id)));
        }

        Ok(())
    }
}
