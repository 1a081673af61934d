use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A DNS record discovered for a target.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    #[serde(default)]
    pub scan_id: Option<Uuid>,
    pub target_id: Uuid,
    pub record_type: String,
    #[serde(default)]
    pub record_value: String,
    #[serde(default = "super::empty_object")]
    pub details: Value,
    #[serde(default = "Utc::now")]
    pub discovered_at: DateTime<Utc>,
}

impl DnsRecord {
    /// A candidate record minted by a scanner; project/scan/target context is
    /// filled in during graph stitching.
    pub fn candidate(record_type: impl Into<String>, record_value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            scan_id: None,
            target_id: Uuid::nil(),
            record_type: record_type.into(),
            record_value: record_value.into(),
            details: super::empty_object(),
            discovered_at: Utc::now(),
        }
    }
}
