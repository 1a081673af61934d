use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// The kind of host-like entity a target represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Ip,
    Cidr,
    Domain,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Ip => "ip",
            TargetKind::Cidr => "cidr",
            TargetKind::Domain => "domain",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Graph node for an IP, CIDR block, or domain.
/// Natural key: `(project_id, kind, value)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Target {
    pub id: Uuid,
    pub project_id: Uuid,
    pub kind: TargetKind,
    pub value: String,
    #[serde(default = "super::empty_object")]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Target {
    /// A candidate target minted by a scanner with a provisional id. The
    /// project id is filled in during graph stitching.
    pub fn candidate(kind: TargetKind, value: impl Into<String>, metadata: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            kind,
            value: value.into(),
            metadata,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Directed relation kinds between two targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ResolvesTo,
    ParentOf,
    ChildOf,
    HostsService,
    Contains,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::ResolvesTo => "resolves_to",
            RelationKind::ParentOf => "parent_of",
            RelationKind::ChildOf => "child_of",
            RelationKind::HostsService => "hosts_service",
            RelationKind::Contains => "contains",
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge between two targets.
/// Natural key: `(source_id, destination_id, kind)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TargetRelation {
    pub id: Uuid,
    pub source_id: Uuid,
    pub destination_id: Uuid,
    pub kind: RelationKind,
    #[serde(default = "super::empty_object")]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl TargetRelation {
    /// A candidate relation referencing provisional target ids. A nil source
    /// is rewritten to the scanned target during stitching.
    pub fn candidate(
        source_id: Uuid,
        destination_id: Uuid,
        kind: RelationKind,
        metadata: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id,
            destination_id,
            kind,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetCreate {
    pub project_id: Uuid,
    pub kind: TargetKind,
    pub value: String,
    #[serde(default = "super::empty_object")]
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetUpdate {
    pub value: Option<String>,
    pub metadata: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_kind_round_trips_through_json() {
        let kind: TargetKind = serde_json::from_str("\"cidr\"").unwrap();
        assert_eq!(kind, TargetKind::Cidr);
        assert_eq!(serde_json::to_string(&TargetKind::Ip).unwrap(), "\"ip\"");
    }

    #[test]
    fn relation_kind_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&RelationKind::ResolvesTo).unwrap(),
            "\"resolves_to\""
        );
        let kind: RelationKind = serde_json::from_str("\"parent_of\"").unwrap();
        assert_eq!(kind, RelationKind::ParentOf);
    }

    #[test]
    fn candidate_targets_mint_provisional_ids() {
        let a = Target::candidate(TargetKind::Ip, "10.0.0.1", super::super::empty_object());
        let b = Target::candidate(TargetKind::Ip, "10.0.0.1", super::super::empty_object());
        assert_ne!(a.id, b.id);
        assert!(a.project_id.is_nil());
    }
}
