use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A TLS certificate observed on a target or service.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    #[serde(default)]
    pub scan_id: Option<Uuid>,
    pub target_id: Uuid,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    #[serde(default)]
    pub application_id: Option<Uuid>,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "super::empty_object")]
    pub details: Value,
    #[serde(default = "Utc::now")]
    pub discovered_at: DateTime<Utc>,
}

impl Certificate {
    /// A candidate certificate minted by a scanner; scan/target context is
    /// filled in during graph stitching.
    pub fn candidate(issuer: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_id: None,
            target_id: Uuid::nil(),
            service_id: None,
            application_id: None,
            issuer: issuer.into(),
            domain: domain.into(),
            issued_at: None,
            expires_at: None,
            details: super::empty_object(),
            discovered_at: Utc::now(),
        }
    }
}
