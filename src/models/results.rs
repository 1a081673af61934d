use serde::{Deserialize, Serialize};

use super::{Application, Certificate, DnsRecord, Finding, Service, Target, TargetRelation};

/// Everything a single scanner invocation emits: findings plus candidate
/// assets that reference each other only by provisional UUIDs.
///
/// Modeled as flat value lists; graph stitching resolves provisional ids to
/// durable ids through a single rewrite map built during the target pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResults {
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub new_targets: Vec<Target>,
    #[serde(default)]
    pub target_relations: Vec<TargetRelation>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub dns_records: Vec<DnsRecord>,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
}

impl ScanResults {
    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
            && self.new_targets.is_empty()
            && self.target_relations.is_empty()
            && self.services.is_empty()
            && self.applications.is_empty()
            && self.dns_records.is_empty()
            && self.certificates.is_empty()
    }
}
