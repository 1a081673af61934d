pub mod application;
pub mod certificate;
pub mod dns_record;
pub mod finding;
pub mod project;
pub mod results;
pub mod scan;
pub mod service;
pub mod session;
pub mod target;

pub use application::{Application, ApplicationCreate};
pub use certificate::Certificate;
pub use dns_record::DnsRecord;
pub use finding::{BulkFindingUpdate, Finding, FindingCreate, Severity};
pub use project::{Project, ProjectCreate, ProjectUpdate};
pub use results::ScanResults;
pub use scan::{
    Scan, ScanConfig, ScanConfigCreate, ScanConfigUpdate, ScanStatus, ScanTask, StartScanInput,
};
pub use service::{Service, ServiceCreate};
pub use session::Session;
pub use target::{RelationKind, Target, TargetCreate, TargetKind, TargetRelation, TargetUpdate};

use serde_json::Value;

/// Merge two free-form JSON objects with the "keep existing scalar, add
/// missing key" rule used by every upsert in the asset store.
///
/// Non-object inputs are treated as empty objects.
pub fn merge_keep_existing(existing: &Value, incoming: &Value) -> Value {
    let mut merged = match existing {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };

    if let Value::Object(incoming) = incoming {
        for (key, value) in incoming {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    Value::Object(merged)
}

/// Empty JSON object, the default for all metadata-style columns.
pub fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Coerce a wire value into a JSON object; jsonb merges reject anything
/// else.
pub fn ensure_object(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        _ => empty_object(),
    }
}
