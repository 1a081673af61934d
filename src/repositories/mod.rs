pub mod application_repo;
pub mod certificate_repo;
pub mod dns_record_repo;
pub mod finding_repo;
pub mod project_repo;
pub mod relation_repo;
pub mod scan_repo;
pub mod service_repo;
pub mod session_repo;
pub mod target_repo;

use std::sync::Arc;

use crate::database::DatabasePool;

pub use application_repo::{ApplicationRepository, SqlxApplicationRepository};
pub use certificate_repo::{CertificateRepository, SqlxCertificateRepository};
pub use dns_record_repo::{DnsRecordRepository, SqlxDnsRecordRepository};
pub use finding_repo::{FindingRepository, SqlxFindingRepository};
pub use project_repo::{ProjectRepository, SqlxProjectRepository};
pub use relation_repo::{RelationRepository, SqlxRelationRepository};
pub use scan_repo::{
    ScanConfigRepository, ScanRepository, SqlxScanConfigRepository, SqlxScanRepository,
};
pub use service_repo::{ServiceRepository, SqlxServiceRepository};
pub use session_repo::{SessionRepository, SqlxSessionRepository};
pub use target_repo::{SqlxTargetRepository, TargetRepository};

/// The asset store as one bundle of repository handles.
///
/// The orchestrator, worker, stitcher, and ingestion pipeline all run
/// against these traits; production wires them to Postgres, tests to an
/// in-memory implementation.
#[derive(Clone)]
pub struct AssetStore {
    pub projects: Arc<dyn ProjectRepository + Send + Sync>,
    pub targets: Arc<dyn TargetRepository + Send + Sync>,
    pub relations: Arc<dyn RelationRepository + Send + Sync>,
    pub services: Arc<dyn ServiceRepository + Send + Sync>,
    pub applications: Arc<dyn ApplicationRepository + Send + Sync>,
    pub findings: Arc<dyn FindingRepository + Send + Sync>,
    pub scans: Arc<dyn ScanRepository + Send + Sync>,
    pub scan_configs: Arc<dyn ScanConfigRepository + Send + Sync>,
    pub dns_records: Arc<dyn DnsRecordRepository + Send + Sync>,
    pub certificates: Arc<dyn CertificateRepository + Send + Sync>,
}

impl AssetStore {
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            projects: Arc::new(SqlxProjectRepository::new(pool.clone())),
            targets: Arc::new(SqlxTargetRepository::new(pool.clone())),
            relations: Arc::new(SqlxRelationRepository::new(pool.clone())),
            services: Arc::new(SqlxServiceRepository::new(pool.clone())),
            applications: Arc::new(SqlxApplicationRepository::new(pool.clone())),
            findings: Arc::new(SqlxFindingRepository::new(pool.clone())),
            scans: Arc::new(SqlxScanRepository::new(pool.clone())),
            scan_configs: Arc::new(SqlxScanConfigRepository::new(pool.clone())),
            dns_records: Arc::new(SqlxDnsRecordRepository::new(pool.clone())),
            certificates: Arc::new(SqlxCertificateRepository::new(pool)),
        }
    }
}
