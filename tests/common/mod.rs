#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use perimeter::config::Settings;
use perimeter::error::ApiError;
use perimeter::models::{
    merge_keep_existing, Application, Certificate, DnsRecord, Finding, Project, ProjectCreate,
    ProjectUpdate, RelationKind, Scan, ScanConfig, ScanConfigCreate, ScanConfigUpdate, ScanResults,
    ScanStatus, ScanTask, Service, Session, Target, TargetKind, TargetRelation,
};
use perimeter::repositories::finding_repo::FindingFilter;
use perimeter::repositories::{
    ApplicationRepository, AssetStore, CertificateRepository, DnsRecordRepository,
    FindingRepository, ProjectRepository, RelationRepository, ScanConfigRepository,
    ScanRepository, ServiceRepository, SessionRepository, TargetRepository,
};
use perimeter::scanner::{ScanError, ScanInput, Scanner};

pub const TEST_TOKEN: &str = "test-session-token";

/// Settings for tests; never read from the environment.
pub fn test_settings() -> Settings {
    Settings {
        database_url: "postgres://unused".to_string(),
        message_bus_url: "amqp://unused".to_string(),
        port: 0,
        cors_allow_origins: vec![],
        log_level: "ERROR".to_string(),
        log_format: "plain".to_string(),
        scan_unit_timeout_secs: 30,
        scan_prefetch: 1,
        ingest_prefetch: 4,
        max_cidr_hosts: 4096,
        nmap_path: "nmap".to_string(),
        subfinder_path: "subfinder".to_string(),
        httpx_path: "httpx".to_string(),
        nuclei_path: "nuclei".to_string(),
        ping_path: "ping".to_string(),
        nuclei_templates_path: None,
    }
}

/// Poll until `check` passes or the timeout elapses.
pub async fn wait_for<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// In-memory asset store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    projects: HashMap<Uuid, Project>,
    targets: HashMap<Uuid, Target>,
    relations: HashMap<Uuid, TargetRelation>,
    services: HashMap<Uuid, Service>,
    applications: HashMap<Uuid, Application>,
    findings: HashMap<Uuid, Finding>,
    scans: HashMap<Uuid, Scan>,
    scan_configs: HashMap<Uuid, ScanConfig>,
    scan_tasks: HashMap<Uuid, ScanTask>,
    dns_records: HashMap<Uuid, DnsRecord>,
    certificates: HashMap<Uuid, Certificate>,
    sessions: HashMap<String, Session>,
}

/// HashMap-backed implementation of every repository trait, mirroring the
/// Postgres semantics: natural-key upserts with keep-existing merges,
/// foreign-key checks, and the scan status compare-and-set.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_store(&self) -> AssetStore {
        let repo: Arc<MemoryStore> = Arc::new(self.clone());
        AssetStore {
            projects: repo.clone(),
            targets: repo.clone(),
            relations: repo.clone(),
            services: repo.clone(),
            applications: repo.clone(),
            findings: repo.clone(),
            scans: repo.clone(),
            scan_configs: repo.clone(),
            dns_records: repo.clone(),
            certificates: repo,
        }
    }

    pub fn session_repo(&self) -> Arc<dyn SessionRepository + Send + Sync> {
        Arc::new(self.clone())
    }

    // ----- seeding helpers -----

    pub fn seed_project(&self, name: &str) -> Project {
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .projects
            .insert(project.id, project.clone());
        project
    }

    pub fn seed_target(&self, project_id: Uuid, kind: TargetKind, value: &str) -> Target {
        let mut target = Target::candidate(kind, value, perimeter::models::empty_object());
        target.project_id = project_id;
        self.inner
            .lock()
            .unwrap()
            .targets
            .insert(target.id, target.clone());
        target
    }

    pub fn seed_scan_config(&self, scanner_type: &str) -> ScanConfig {
        let config = ScanConfig {
            id: Uuid::new_v4(),
            name: format!("{scanner_type} config"),
            scanner_type: scanner_type.to_string(),
            parameters: perimeter::models::empty_object(),
            active: true,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .scan_configs
            .insert(config.id, config.clone());
        config
    }

    pub fn seed_session(&self, token: &str) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            user_id: "tester".to_string(),
            session_token: token.to_string(),
            expires: Utc::now() + chrono::Duration::hours(1),
        };
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(token.to_string(), session.clone());
        session
    }

    pub fn seed_expired_session(&self, token: &str) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            user_id: "tester".to_string(),
            session_token: token.to_string(),
            expires: Utc::now() - chrono::Duration::hours(1),
        };
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(token.to_string(), session.clone());
        session
    }

    pub fn seed_scan(&self, project_id: Uuid, scan_config_id: Uuid) -> Scan {
        let scan = Scan {
            id: Uuid::new_v4(),
            project_id,
            scan_config_id,
            status: ScanStatus::Pending,
            started_at: None,
            completed_at: None,
            raw_results: None,
            error: String::new(),
            created_at: Utc::now(),
        };
        self.inner.lock().unwrap().scans.insert(scan.id, scan.clone());
        scan
    }

    pub fn scan(&self, id: &Uuid) -> Option<Scan> {
        self.inner.lock().unwrap().scans.get(id).cloned()
    }

    pub fn services_for(&self, target_id: &Uuid) -> Vec<Service> {
        let mut services: Vec<Service> = self
            .inner
            .lock()
            .unwrap()
            .services
            .values()
            .filter(|s| s.target_id == *target_id)
            .cloned()
            .collect();
        services.sort_by_key(|s| s.port);
        services
    }

    pub fn find_target(&self, project_id: &Uuid, kind: TargetKind, value: &str) -> Option<Target> {
        self.inner
            .lock()
            .unwrap()
            .targets
            .values()
            .find(|t| t.project_id == *project_id && t.kind == kind && t.value == value)
            .cloned()
    }

    pub fn target_count(&self) -> usize {
        self.inner.lock().unwrap().targets.len()
    }

    pub fn relation_count(&self) -> usize {
        self.inner.lock().unwrap().relations.len()
    }

    pub fn finding_count(&self) -> usize {
        self.inner.lock().unwrap().findings.len()
    }

    pub fn service_count(&self) -> usize {
        self.inner.lock().unwrap().services.len()
    }

    pub fn all_findings(&self) -> Vec<Finding> {
        self.inner.lock().unwrap().findings.values().cloned().collect()
    }

    pub fn all_relations(&self) -> Vec<TargetRelation> {
        self.inner
            .lock()
            .unwrap()
            .relations
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProjectRepository for MemoryStore {
    async fn create(&self, input: &ProjectCreate) -> Result<Project, ApiError> {
        let project = Project {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            description: input.description.clone(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .projects
            .insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Project>, ApiError> {
        Ok(self.inner.lock().unwrap().projects.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Project>, ApiError> {
        Ok(self.inner.lock().unwrap().projects.values().cloned().collect())
    }

    async fn update(&self, id: &Uuid, update: &ProjectUpdate) -> Result<Project, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let project = inner
            .projects
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("Project {} not found", id)))?;
        if let Some(name) = &update.name {
            project.name = name.clone();
        }
        if let Some(description) = &update.description {
            project.description = description.clone();
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .projects
            .remove(id)
            .ok_or_else(|| ApiError::NotFound(format!("Project {} not found", id)))?;

        // Cascade: targets and everything hanging off them.
        let target_ids: Vec<Uuid> = inner
            .targets
            .values()
            .filter(|t| t.project_id == *id)
            .map(|t| t.id)
            .collect();
        inner.targets.retain(|_, t| t.project_id != *id);
        inner.relations.retain(|_, r| {
            !target_ids.contains(&r.source_id) && !target_ids.contains(&r.destination_id)
        });
        inner.services.retain(|_, s| !target_ids.contains(&s.target_id));
        inner.findings.retain(|_, f| !target_ids.contains(&f.target_id));
        inner.scans.retain(|_, s| s.project_id != *id);
        inner.applications.retain(|_, a| a.project_id != *id);
        inner.dns_records.retain(|_, d| d.project_id != *id);
        inner
            .certificates
            .retain(|_, c| !target_ids.contains(&c.target_id));
        Ok(())
    }
}

#[async_trait]
impl TargetRepository for MemoryStore {
    async fn upsert(&self, target: &Target) -> Result<Target, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.projects.contains_key(&target.project_id) {
            return Err(ApiError::NotFound(format!(
                "Project {} not found",
                target.project_id
            )));
        }

        let existing_id = inner
            .targets
            .values()
            .find(|t| {
                t.project_id == target.project_id
                    && t.kind == target.kind
                    && t.value == target.value
            })
            .map(|t| t.id);

        match existing_id {
            Some(id) => {
                let existing = inner.targets.get_mut(&id).unwrap();
                existing.metadata = merge_keep_existing(&existing.metadata, &target.metadata);
                existing.updated_at = Utc::now();
                Ok(existing.clone())
            }
            None => {
                inner.targets.insert(target.id, target.clone());
                Ok(target.clone())
            }
        }
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Target>, ApiError> {
        Ok(self.inner.lock().unwrap().targets.get(id).cloned())
    }

    async fn find_by_natural_key(
        &self,
        project_id: &Uuid,
        kind: TargetKind,
        value: &str,
    ) -> Result<Option<Target>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .targets
            .values()
            .find(|t| t.project_id == *project_id && t.kind == kind && t.value == value)
            .cloned())
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Target>, ApiError> {
        let mut targets: Vec<Target> = self
            .inner
            .lock()
            .unwrap()
            .targets
            .values()
            .filter(|t| t.project_id == *project_id)
            .cloned()
            .collect();
        targets.sort_by_key(|t| t.created_at);
        Ok(targets)
    }

    async fn update_metadata(&self, id: &Uuid, metadata: &Value) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let target = inner
            .targets
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("Target {} not found", id)))?;
        target.metadata = metadata.clone();
        target.updated_at = Utc::now();
        Ok(())
    }

    async fn update_value(&self, id: &Uuid, value: &str) -> Result<Target, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let target = inner
            .targets
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("Target {} not found", id)))?;
        target.value = value.to_string();
        target.updated_at = Utc::now();
        Ok(target.clone())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .targets
            .remove(id)
            .ok_or_else(|| ApiError::NotFound(format!("Target {} not found", id)))?;
        inner
            .relations
            .retain(|_, r| r.source_id != *id && r.destination_id != *id);
        inner.services.retain(|_, s| s.target_id != *id);
        inner.findings.retain(|_, f| f.target_id != *id);
        inner.dns_records.retain(|_, d| d.target_id != *id);
        inner.certificates.retain(|_, c| c.target_id != *id);
        Ok(())
    }
}

#[async_trait]
impl RelationRepository for MemoryStore {
    async fn upsert(&self, relation: &TargetRelation) -> Result<TargetRelation, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.targets.contains_key(&relation.source_id)
            || !inner.targets.contains_key(&relation.destination_id)
        {
            return Err(ApiError::NotFound(format!(
                "Relation endpoint missing: {} -> {}",
                relation.source_id, relation.destination_id
            )));
        }

        let existing_id = inner
            .relations
            .values()
            .find(|r| {
                r.source_id == relation.source_id
                    && r.destination_id == relation.destination_id
                    && r.kind == relation.kind
            })
            .map(|r| r.id);

        match existing_id {
            Some(id) => {
                let existing = inner.relations.get_mut(&id).unwrap();
                existing.metadata = merge_keep_existing(&existing.metadata, &relation.metadata);
                Ok(existing.clone())
            }
            None => {
                inner.relations.insert(relation.id, relation.clone());
                Ok(relation.clone())
            }
        }
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<TargetRelation>, ApiError> {
        Ok(self.inner.lock().unwrap().relations.get(id).cloned())
    }

    async fn list_for_target(&self, target_id: &Uuid) -> Result<Vec<TargetRelation>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .relations
            .values()
            .filter(|r| r.source_id == *target_id || r.destination_id == *target_id)
            .cloned()
            .collect())
    }

    async fn list_filtered(
        &self,
        source_id: Option<Uuid>,
        destination_id: Option<Uuid>,
        kind: Option<RelationKind>,
    ) -> Result<Vec<TargetRelation>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .relations
            .values()
            .filter(|r| source_id.is_none_or(|id| r.source_id == id))
            .filter(|r| destination_id.is_none_or(|id| r.destination_id == id))
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        self.inner
            .lock()
            .unwrap()
            .relations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("Relation {} not found", id)))
    }
}

#[async_trait]
impl ServiceRepository for MemoryStore {
    async fn upsert(&self, service: &Service) -> Result<Service, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.targets.contains_key(&service.target_id) {
            return Err(ApiError::Database(sqlx::Error::RowNotFound));
        }

        let existing_id = inner
            .services
            .values()
            .find(|s| {
                s.target_id == service.target_id
                    && s.port == service.port
                    && s.protocol == service.protocol
            })
            .map(|s| s.id);

        match existing_id {
            Some(id) => {
                let existing = inner.services.get_mut(&id).unwrap();
                if existing.service_name.is_empty() {
                    existing.service_name = service.service_name.clone();
                }
                if existing.version.is_empty() {
                    existing.version = service.version.clone();
                }
                if existing.title.is_empty() {
                    existing.title = service.title.clone();
                }
                if existing.description.is_empty() {
                    existing.description = service.description.clone();
                }
                if existing.banner.is_empty() {
                    existing.banner = service.banner.clone();
                }
                existing.raw_info = merge_keep_existing(&existing.raw_info, &service.raw_info);
                existing.updated_at = Utc::now();
                Ok(existing.clone())
            }
            None => {
                inner.services.insert(service.id, service.clone());
                Ok(service.clone())
            }
        }
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Service>, ApiError> {
        Ok(self.inner.lock().unwrap().services.get(id).cloned())
    }

    async fn find_by_endpoint(
        &self,
        target_id: &Uuid,
        port: i32,
        protocol: &str,
    ) -> Result<Option<Service>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .services
            .values()
            .find(|s| s.target_id == *target_id && s.port == port && s.protocol == protocol)
            .cloned())
    }

    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<Service>, ApiError> {
        let mut services: Vec<Service> = self
            .inner
            .lock()
            .unwrap()
            .services
            .values()
            .filter(|s| s.target_id == *target_id)
            .cloned()
            .collect();
        services.sort_by_key(|s| s.port);
        Ok(services)
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Service>, ApiError> {
        let inner = self.inner.lock().unwrap();
        let target_ids: Vec<Uuid> = inner
            .targets
            .values()
            .filter(|t| t.project_id == *project_id)
            .map(|t| t.id)
            .collect();
        Ok(inner
            .services
            .values()
            .filter(|s| target_ids.contains(&s.target_id))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        self.inner
            .lock()
            .unwrap()
            .services
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("Service {} not found", id)))
    }
}

#[async_trait]
impl ApplicationRepository for MemoryStore {
    async fn create(&self, application: &Application) -> Result<Application, ApiError> {
        self.inner
            .lock()
            .unwrap()
            .applications
            .insert(application.id, application.clone());
        Ok(application.clone())
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Application>, ApiError> {
        Ok(self.inner.lock().unwrap().applications.get(id).cloned())
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Application>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .applications
            .values()
            .filter(|a| a.project_id == *project_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        self.inner
            .lock()
            .unwrap()
            .applications
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("Application {} not found", id)))
    }
}

#[async_trait]
impl FindingRepository for MemoryStore {
    async fn upsert(&self, finding: &Finding) -> Result<Finding, ApiError> {
        if finding.target_id.is_nil() {
            return Err(ApiError::validation(
                "finding requires a target_id for deduplication",
            ));
        }

        let mut inner = self.inner.lock().unwrap();
        let existing_id = inner
            .findings
            .values()
            .find(|f| {
                f.finding_type == finding.finding_type
                    && f.severity == finding.severity
                    && (f.target_id == finding.target_id
                        || (finding.service_id.is_some() && f.service_id == finding.service_id)
                        || (finding.application_id.is_some()
                            && f.application_id == finding.application_id))
            })
            .map(|f| f.id);

        match existing_id {
            Some(id) => {
                let existing = inner.findings.get_mut(&id).unwrap();
                existing.details = merge_keep_existing(&existing.details, &finding.details);
                Ok(existing.clone())
            }
            None => {
                inner.findings.insert(finding.id, finding.clone());
                Ok(finding.clone())
            }
        }
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Finding>, ApiError> {
        Ok(self.inner.lock().unwrap().findings.get(id).cloned())
    }

    async fn list_by_scan(&self, scan_id: &Uuid) -> Result<Vec<Finding>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .findings
            .values()
            .filter(|f| f.scan_id == Some(*scan_id))
            .cloned()
            .collect())
    }

    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<Finding>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .findings
            .values()
            .filter(|f| f.target_id == *target_id)
            .cloned()
            .collect())
    }

    async fn list_filtered(&self, filter: &FindingFilter) -> Result<Vec<Finding>, ApiError> {
        let inner = self.inner.lock().unwrap();
        let project_targets: Option<Vec<Uuid>> = filter.project_id.map(|project_id| {
            inner
                .targets
                .values()
                .filter(|t| t.project_id == project_id)
                .map(|t| t.id)
                .collect()
        });

        Ok(inner
            .findings
            .values()
            .filter(|f| {
                project_targets
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&f.target_id))
            })
            .filter(|f| filter.severity.is_none_or(|s| f.severity == s))
            .filter(|f| {
                filter
                    .finding_type
                    .as_ref()
                    .is_none_or(|t| &f.finding_type == t)
            })
            .filter(|f| filter.fixed.is_none_or(|fixed| f.fixed == fixed))
            .cloned()
            .collect())
    }

    async fn bulk_update(
        &self,
        ids: &[Uuid],
        fixed: Option<bool>,
        verified: Option<bool>,
    ) -> Result<u64, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0;
        for id in ids {
            if let Some(finding) = inner.findings.get_mut(id) {
                if let Some(fixed) = fixed {
                    finding.fixed = fixed;
                }
                if let Some(verified) = verified {
                    finding.verified = verified;
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count_by_severity(
        &self,
        project_id: &Uuid,
    ) -> Result<HashMap<String, i64>, ApiError> {
        let inner = self.inner.lock().unwrap();
        let target_ids: Vec<Uuid> = inner
            .targets
            .values()
            .filter(|t| t.project_id == *project_id)
            .map(|t| t.id)
            .collect();

        let mut counts = HashMap::new();
        for finding in inner.findings.values() {
            if target_ids.contains(&finding.target_id) {
                *counts
                    .entry(finding.severity.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        self.inner
            .lock()
            .unwrap()
            .findings
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("Finding {} not found", id)))
    }
}

#[async_trait]
impl ScanRepository for MemoryStore {
    async fn create(&self, project_id: &Uuid, scan_config_id: &Uuid) -> Result<Scan, ApiError> {
        let scan = Scan {
            id: Uuid::new_v4(),
            project_id: *project_id,
            scan_config_id: *scan_config_id,
            status: ScanStatus::Pending,
            started_at: None,
            completed_at: None,
            raw_results: None,
            error: String::new(),
            created_at: Utc::now(),
        };
        self.inner.lock().unwrap().scans.insert(scan.id, scan.clone());
        Ok(scan)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<Scan>, ApiError> {
        Ok(self.inner.lock().unwrap().scans.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Scan>, ApiError> {
        Ok(self.inner.lock().unwrap().scans.values().cloned().collect())
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Scan>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .scans
            .values()
            .filter(|s| s.project_id == *project_id)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: &Uuid,
        status: ScanStatus,
        message: &str,
    ) -> Result<bool, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let scan = inner
            .scans
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("Scan {} not found", id)))?;

        if status == ScanStatus::Pending
            || !matches!(scan.status, ScanStatus::Pending | ScanStatus::Running)
        {
            return Ok(false);
        }

        scan.status = status;
        if status == ScanStatus::Running && scan.started_at.is_none() {
            scan.started_at = Some(Utc::now());
        }
        if status.is_terminal() && scan.completed_at.is_none() {
            scan.completed_at = Some(Utc::now());
        }
        if status == ScanStatus::Failed {
            scan.error = message.to_string();
        }
        if status == ScanStatus::Completed {
            scan.raw_results = Some(serde_json::json!({"summary": message}));
        }

        Ok(true)
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        self.inner
            .lock()
            .unwrap()
            .scans
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("Scan {} not found", id)))
    }

    async fn create_task(&self, task: &ScanTask) -> Result<ScanTask, ApiError> {
        self.inner
            .lock()
            .unwrap()
            .scan_tasks
            .insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn list_tasks(&self, scan_id: &Uuid) -> Result<Vec<ScanTask>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .scan_tasks
            .values()
            .filter(|t| t.scan_id == *scan_id)
            .cloned()
            .collect())
    }

    async fn update_task_status(
        &self,
        task_id: &Uuid,
        status: ScanStatus,
        result: Option<Value>,
    ) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let task = inner
            .scan_tasks
            .get_mut(task_id)
            .ok_or_else(|| ApiError::NotFound(format!("Scan task {} not found", task_id)))?;
        task.status = status;
        if result.is_some() {
            task.result = result;
        }
        task.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ScanConfigRepository for MemoryStore {
    async fn create(&self, input: &ScanConfigCreate) -> Result<ScanConfig, ApiError> {
        let config = ScanConfig {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            scanner_type: input.scanner_type.clone(),
            parameters: input.parameters.clone(),
            active: input.active,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .scan_configs
            .insert(config.id, config.clone());
        Ok(config)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<ScanConfig>, ApiError> {
        Ok(self.inner.lock().unwrap().scan_configs.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ScanConfig>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .scan_configs
            .values()
            .cloned()
            .collect())
    }

    async fn update(&self, id: &Uuid, update: &ScanConfigUpdate) -> Result<ScanConfig, ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let config = inner
            .scan_configs
            .get_mut(id)
            .ok_or_else(|| ApiError::NotFound(format!("Scan config {} not found", id)))?;
        if let Some(name) = &update.name {
            config.name = name.clone();
        }
        if let Some(scanner_type) = &update.scanner_type {
            config.scanner_type = scanner_type.clone();
        }
        if let Some(parameters) = &update.parameters {
            config.parameters = parameters.clone();
        }
        if let Some(active) = update.active {
            config.active = active;
        }
        Ok(config.clone())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        self.inner
            .lock()
            .unwrap()
            .scan_configs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("Scan config {} not found", id)))
    }
}

#[async_trait]
impl DnsRecordRepository for MemoryStore {
    async fn create(&self, record: &DnsRecord) -> Result<DnsRecord, ApiError> {
        self.inner
            .lock()
            .unwrap()
            .dns_records
            .insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<DnsRecord>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .dns_records
            .values()
            .filter(|r| r.target_id == *target_id)
            .cloned()
            .collect())
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<DnsRecord>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .dns_records
            .values()
            .filter(|r| r.project_id == *project_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        self.inner
            .lock()
            .unwrap()
            .dns_records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("DNS record {} not found", id)))
    }
}

#[async_trait]
impl CertificateRepository for MemoryStore {
    async fn create(&self, certificate: &Certificate) -> Result<Certificate, ApiError> {
        self.inner
            .lock()
            .unwrap()
            .certificates
            .insert(certificate.id, certificate.clone());
        Ok(certificate.clone())
    }

    async fn list_by_target(&self, target_id: &Uuid) -> Result<Vec<Certificate>, ApiError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .certificates
            .values()
            .filter(|c| c.target_id == *target_id)
            .cloned()
            .collect())
    }

    async fn list_by_project(&self, project_id: &Uuid) -> Result<Vec<Certificate>, ApiError> {
        let inner = self.inner.lock().unwrap();
        let target_ids: Vec<Uuid> = inner
            .targets
            .values()
            .filter(|t| t.project_id == *project_id)
            .map(|t| t.id)
            .collect();
        Ok(inner
            .certificates
            .values()
            .filter(|c| target_ids.contains(&c.target_id))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &Uuid) -> Result<(), ApiError> {
        self.inner
            .lock()
            .unwrap()
            .certificates
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(format!("Certificate {} not found", id)))
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, ApiError> {
        Ok(self.inner.lock().unwrap().sessions.get(token).cloned())
    }
}

// ---------------------------------------------------------------------------
// Stub scanner
// ---------------------------------------------------------------------------

type StubBehavior =
    Box<dyn Fn(&ScanInput) -> Result<ScanResults, ScanError> + Send + Sync + 'static>;

/// Scanner stub with scripted results, optional per-unit delay (honoring the
/// cancellation token), and full capability control.
pub struct StubScanner {
    scanner_name: &'static str,
    supports_services: bool,
    fail_init: bool,
    delay: Option<Duration>,
    sentinel: Mutex<Option<std::path::PathBuf>>,
    behavior: StubBehavior,
}

impl StubScanner {
    pub fn new(
        scanner_name: &'static str,
        behavior: impl Fn(&ScanInput) -> Result<ScanResults, ScanError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            scanner_name,
            supports_services: false,
            fail_init: false,
            delay: None,
            sentinel: Mutex::new(None),
            behavior: Box::new(behavior),
        }
    }

    /// Make `initialize` fail as if the tool binary were missing.
    pub fn with_failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn with_services(mut self) -> Self {
        self.supports_services = true;
        self
    }

    /// Sleep this long before producing results; cancellation interrupts the
    /// sleep like it would kill a subprocess.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Write this file after an *uninterrupted* run, standing in for the
    /// side effects of a subprocess that ran to completion.
    pub fn with_sentinel(self, path: std::path::PathBuf) -> Self {
        *self.sentinel.lock().unwrap() = Some(path);
        self
    }
}

#[async_trait]
impl Scanner for StubScanner {
    fn name(&self) -> &'static str {
        self.scanner_name
    }

    async fn initialize(&self) -> Result<(), ScanError> {
        if self.fail_init {
            return Err(ScanError::Unavailable(format!(
                "{}: binary not found",
                self.scanner_name
            )));
        }
        Ok(())
    }

    fn supports_target_kind(&self, _kind: TargetKind) -> bool {
        true
    }

    fn supports_services(&self) -> bool {
        self.supports_services
    }

    fn adapt_service(&self, service: &Service, host: &Target) -> Option<ScanInput> {
        Some(ScanInput::endpoint(service, host))
    }

    async fn scan(
        &self,
        cancel: &CancellationToken,
        input: &ScanInput,
        _params: &Value,
    ) -> Result<ScanResults, ScanError> {
        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ScanError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Some(path) = self.sentinel.lock().unwrap().as_ref() {
            std::fs::write(path, b"completed").expect("failed to write sentinel");
        }

        (self.behavior)(input)
    }
}
