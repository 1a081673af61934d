use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Scan lifecycle states. Transitions form a prefix of
/// `pending -> running -> {completed | failed | cancelled}`; terminal states
/// never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Failed | ScanStatus::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ScanStatus) -> bool {
        match self {
            ScanStatus::Pending => matches!(
                next,
                ScanStatus::Running
                    | ScanStatus::Completed
                    | ScanStatus::Failed
                    | ScanStatus::Cancelled
            ),
            ScanStatus::Running => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single execution of one scanner configuration over some targets.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub project_id: Uuid,
    pub scan_config_id: Uuid,
    pub status: ScanStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub raw_results: Option<Value>,
    #[serde(default)]
    pub error: String,
    pub created_at: DateTime<Utc>,
}

/// Reusable scanner configuration.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScanConfig {
    pub id: Uuid,
    pub name: String,
    pub scanner_type: String,
    #[serde(default = "super::empty_object")]
    pub parameters: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfigCreate {
    pub name: String,
    pub scanner_type: String,
    #[serde(default = "super::empty_object")]
    pub parameters: Value,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfigUpdate {
    pub name: Option<String>,
    pub scanner_type: Option<String>,
    pub parameters: Option<Value>,
    pub active: Option<bool>,
}

/// One unit of work within a scan (a target or a service), for fine-grained
/// progress tracking.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScanTask {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub task_type: String,
    #[serde(default = "super::empty_object")]
    pub parameters: Value,
    pub status: ScanStatus,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for starting a scan.
#[derive(Debug, Clone, Deserialize)]
pub struct StartScanInput {
    pub project_id: Uuid,
    pub scan_config_id: Uuid,
    #[serde(default)]
    pub target_ids: Vec<Uuid>,
    #[serde(default)]
    pub service_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_start_or_cancel() {
        assert!(ScanStatus::Pending.can_transition_to(ScanStatus::Running));
        assert!(ScanStatus::Pending.can_transition_to(ScanStatus::Cancelled));
        assert!(!ScanStatus::Pending.can_transition_to(ScanStatus::Pending));
    }

    #[test]
    fn running_only_reaches_terminal_states() {
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Completed));
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Failed));
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Cancelled));
        assert!(!ScanStatus::Running.can_transition_to(ScanStatus::Pending));
    }

    #[test]
    fn terminal_states_are_frozen() {
        for terminal in [
            ScanStatus::Completed,
            ScanStatus::Failed,
            ScanStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                ScanStatus::Pending,
                ScanStatus::Running,
                ScanStatus::Completed,
                ScanStatus::Failed,
                ScanStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }
}
