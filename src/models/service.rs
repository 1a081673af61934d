use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A listening endpoint on a target.
/// Natural key: `(target_id, port, protocol)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub target_id: Uuid,
    pub port: i32,
    pub protocol: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub banner: String,
    #[serde(default = "super::empty_object")]
    pub raw_info: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Service {
    /// A candidate service minted by a scanner. A nil target id is rewritten
    /// to the scanned target during stitching.
    pub fn candidate(target_id: Uuid, port: u16, protocol: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id,
            port: i32::from(port),
            protocol: protocol.into(),
            service_name: String::new(),
            version: String::new(),
            title: String::new(),
            description: String::new(),
            banner: String::new(),
            raw_info: super::empty_object(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceCreate {
    pub target_id: Uuid,
    pub port: i32,
    pub protocol: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub banner: String,
    #[serde(default = "super::empty_object")]
    pub raw_info: Value,
}
