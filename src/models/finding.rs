use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        }
    }

    /// Parse a tool-reported severity string, mapping anything unexpected to
    /// `Unknown`.
    pub fn parse_lossy(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            "info" | "informational" => Severity::Info,
            _ => Severity::Unknown,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discovered condition attached to a target, service, or application.
///
/// Deduplication key: `(target_id | service_id | application_id,
/// finding_type, severity)` with a keep-existing merge of `details`.
/// `target_id` is always required.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    #[serde(default)]
    pub scan_id: Option<Uuid>,
    pub target_id: Uuid,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    #[serde(default)]
    pub application_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub finding_type: String,
    #[serde(default = "super::empty_object")]
    pub details: Value,
    #[serde(default = "Utc::now")]
    pub discovered_at: DateTime<Utc>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub fixed: bool,
    #[serde(default)]
    pub manual: bool,
}

impl Finding {
    /// A finding emitted by a scanner. Scan and target ids are filled in
    /// during graph stitching; a nil target id means "the scanned target".
    pub fn candidate(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        finding_type: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_id: None,
            target_id: Uuid::nil(),
            service_id: None,
            application_id: None,
            title: title.into(),
            description: description.into(),
            severity,
            finding_type: finding_type.into(),
            details,
            discovered_at: Utc::now(),
            verified: false,
            fixed: false,
            manual: false,
        }
    }
}

/// Input for manually creating a finding through the REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct FindingCreate {
    pub target_id: Uuid,
    #[serde(default)]
    pub scan_id: Option<Uuid>,
    #[serde(default)]
    pub service_id: Option<Uuid>,
    #[serde(default)]
    pub application_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    pub finding_type: String,
    #[serde(default = "super::empty_object")]
    pub details: Value,
}

/// Bulk triage update applied to a set of findings.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkFindingUpdate {
    pub finding_ids: Vec<Uuid>,
    #[serde(default)]
    pub fixed: Option<bool>,
    #[serde(default)]
    pub verified: Option<bool>,
}
