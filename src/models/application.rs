use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Higher-level software identified on a target or service, e.g. a CMS or a
/// ticketing system.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(default)]
    pub scan_id: Option<Uuid>,
    pub name: String,
    pub app_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub host_target: Option<Uuid>,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    #[serde(default = "super::empty_object")]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// A candidate application minted by a scanner. Project, scan, and host
    /// target are filled in during graph stitching.
    pub fn candidate(
        name: impl Into<String>,
        app_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            scan_id: None,
            name: name.into(),
            app_type: app_type.into(),
            version: String::new(),
            description: String::new(),
            url: url.into(),
            host_target: None,
            service_id: None,
            metadata: super::empty_object(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationCreate {
    pub project_id: Uuid,
    pub name: String,
    pub app_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub host_target: Option<Uuid>,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    #[serde(default = "super::empty_object")]
    pub metadata: Value,
}
