use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::{
    bus::{publish_json, MessageBus, Queue},
    error::ApiError,
    models::{merge_keep_existing, Application, Finding, ScanResults, Service, Target},
    repositories::AssetStore,
};

/// What one stitched `ScanResults` contributed to the graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct StitchSummary {
    pub findings: usize,
    pub new_targets: usize,
    pub relations: usize,
    pub services: usize,
}

impl StitchSummary {
    pub fn accumulate(&mut self, other: StitchSummary) {
        self.findings += other.findings;
        self.new_targets += other.new_targets;
        self.relations += other.relations;
        self.services += other.services;
    }
}

/// Rewrites provisional ids in a scanner's results to durable ids and routes
/// the assets to their queues (targets, services, relations, findings) or
/// directly into the store (applications, DNS records, certificates).
///
/// Deterministic and single-threaded per scan: passes run in dependency
/// order, and a single rewrite map built during the target pass resolves
/// every cross-reference.
#[derive(Clone)]
pub struct ResultStitcher {
    store: AssetStore,
    bus: Arc<dyn MessageBus>,
}

impl ResultStitcher {
    pub fn new(store: AssetStore, bus: Arc<dyn MessageBus>) -> Self {
        Self { store, bus }
    }

    /// Process one unit's results. `host_target` is the scanned target (for
    /// a service scan, the service's target); `scanned_service` is set for
    /// service scans.
    pub async fn process(
        &self,
        scan_id: Uuid,
        host_target: &Target,
        scanned_service: Option<&Service>,
        mut results: ScanResults,
    ) -> Result<StitchSummary, ApiError> {
        let project_id = host_target.project_id;
        let host_target_id = host_target.id;
        let mut summary = StitchSummary::default();

        // Target pass: dedupe candidates against the graph and build the
        // provisional -> durable rewrite map.
        let mut target_map: HashMap<Uuid, Uuid> = HashMap::new();
        for candidate in &mut results.new_targets {
            candidate.project_id = project_id;
            let provisional_id = candidate.id;

            match self
                .store
                .targets
                .find_by_natural_key(&project_id, candidate.kind, &candidate.value)
                .await?
            {
                Some(existing) => {
                    target_map.insert(provisional_id, existing.id);
                    self.merge_target_metadata(&existing, &candidate.metadata)
                        .await?;
                    tracing::debug!(
                        value = %candidate.value,
                        kind = %candidate.kind,
                        id = %existing.id,
                        "candidate target already exists"
                    );
                }
                None => {
                    publish_json(self.bus.as_ref(), Queue::Targets, candidate).await?;
                    target_map.insert(provisional_id, provisional_id);
                    summary.new_targets += 1;
                    tracing::debug!(
                        value = %candidate.value,
                        kind = %candidate.kind,
                        id = %provisional_id,
                        "queued new target"
                    );
                }
            }
        }

        // Service pass: attach to durable targets, dedupe by endpoint, and
        // remember provisional service ids for the finding pass.
        let mut service_map: HashMap<Uuid, Uuid> = HashMap::new();
        for candidate in &mut results.services {
            let provisional_id = candidate.id;

            candidate.target_id = if candidate.target_id.is_nil() {
                host_target_id
            } else {
                *target_map
                    .get(&candidate.target_id)
                    .unwrap_or(&candidate.target_id)
            };
            // A target id the map does not know and the store has never seen
            // cannot hold a service; fall back to the scanned host.
            if !target_map.values().any(|id| *id == candidate.target_id)
                && self
                    .store
                    .targets
                    .get_by_id(&candidate.target_id)
                    .await?
                    .is_none()
            {
                candidate.target_id = host_target_id;
            }

            match self
                .store
                .services
                .find_by_endpoint(&candidate.target_id, candidate.port, &candidate.protocol)
                .await?
            {
                Some(existing) => {
                    // Merge through the store so the durable id is known now;
                    // downstream findings rewrite onto it.
                    let merged = self.store.services.upsert(candidate).await?;
                    service_map.insert(provisional_id, existing.id);
                    debug_assert_eq!(merged.id, existing.id);
                }
                None => {
                    publish_json(self.bus.as_ref(), Queue::Services, candidate).await?;
                    service_map.insert(provisional_id, provisional_id);
                }
            }
            summary.services += 1;
        }

        // Relation pass: rewrite endpoints; drop anything whose endpoints
        // will not exist.
        for relation in &mut results.target_relations {
            if relation.source_id.is_nil() {
                relation.source_id = host_target_id;
            }
            relation.source_id = *target_map
                .get(&relation.source_id)
                .unwrap_or(&relation.source_id);
            relation.destination_id = *target_map
                .get(&relation.destination_id)
                .unwrap_or(&relation.destination_id);

            if !self.target_will_exist(&target_map, relation.source_id).await?
                || !self
                    .target_will_exist(&target_map, relation.destination_id)
                    .await?
            {
                tracing::warn!(
                    source = %relation.source_id,
                    destination = %relation.destination_id,
                    kind = %relation.kind,
                    "dropping relation: source or destination target does not exist"
                );
                continue;
            }

            publish_json(self.bus.as_ref(), Queue::Relations, relation).await?;
            summary.relations += 1;
        }

        // Application pass: persist directly, then associate findings.
        for application in &mut results.applications {
            application.project_id = project_id;
            application.scan_id = Some(scan_id);
            if application.host_target.is_none() {
                application.host_target = Some(host_target_id);
            }
            if let Some(service_id) = application.service_id {
                application.service_id = service_map.get(&service_id).copied().or(Some(service_id));
            }

            let created = match self.store.applications.create(application).await {
                Ok(created) => created,
                Err(e) => {
                    tracing::warn!(name = %application.name, error = %e, "failed to create application");
                    continue;
                }
            };

            for finding in &mut results.findings {
                if should_associate_with_app(finding, &created) {
                    finding.application_id = Some(created.id);
                }
            }

            tracing::debug!(name = %created.name, id = %created.id, "created application");
        }

        // DNS record pass.
        for record in &mut results.dns_records {
            record.project_id = project_id;
            record.scan_id = Some(scan_id);
            record.target_id = host_target_id;

            if let Err(e) = self.store.dns_records.create(record).await {
                tracing::warn!(record_type = %record.record_type, error = %e, "failed to create DNS record");
            }
        }

        // Certificate pass.
        for certificate in &mut results.certificates {
            certificate.scan_id = Some(scan_id);
            if certificate.target_id.is_nil() {
                certificate.target_id = host_target_id;
            }
            if let Some(service_id) = certificate.service_id {
                certificate.service_id = service_map.get(&service_id).copied().or(Some(service_id));
            }

            if let Err(e) = self.store.certificates.create(certificate).await {
                tracing::warn!(domain = %certificate.domain, error = %e, "failed to create certificate");
            }
        }

        // Finding pass: attach to the scanned unit and rewrite provisional
        // service references to their durable ids.
        for finding in &mut results.findings {
            finding.scan_id = Some(scan_id);

            finding.target_id = match target_map.get(&finding.target_id) {
                Some(durable) => *durable,
                None => host_target_id,
            };

            if let Some(service_id) = finding.service_id {
                finding.service_id = service_map.get(&service_id).copied().or(Some(service_id));
            } else if let Some(service) = scanned_service {
                finding.service_id = Some(service.id);
            }

            publish_json(self.bus.as_ref(), Queue::Findings, finding).await?;
            summary.findings += 1;
        }

        Ok(summary)
    }

    async fn merge_target_metadata(
        &self,
        existing: &Target,
        incoming: &Value,
    ) -> Result<(), ApiError> {
        let merged = merge_keep_existing(&existing.metadata, incoming);
        if merged != existing.metadata {
            self.store
                .targets
                .update_metadata(&existing.id, &merged)
                .await?;
        }
        Ok(())
    }

    /// An endpoint is safe to reference if the target pass queued it (it maps
    /// to itself through the rewrite map) or the store already has it.
    async fn target_will_exist(
        &self,
        target_map: &HashMap<Uuid, Uuid>,
        id: Uuid,
    ) -> Result<bool, ApiError> {
        if id.is_nil() {
            return Ok(false);
        }
        if target_map.values().any(|durable| *durable == id) {
            return Ok(true);
        }
        Ok(self.store.targets.get_by_id(&id).await?.is_some())
    }
}

/// Association rules between a finding and an application discovered in the
/// same scan result.
fn should_associate_with_app(finding: &Finding, app: &Application) -> bool {
    if finding.application_id.is_some() {
        return false;
    }

    // URL substring match in either direction.
    if !app.url.is_empty() {
        if let Some(finding_url) = finding.details.get("url").and_then(Value::as_str) {
            if !finding_url.is_empty()
                && (finding_url.contains(&app.url) || app.url.contains(finding_url))
            {
                return true;
            }
        }
    }

    // Finding type mentions the application technology.
    if !app.app_type.is_empty()
        && finding
            .finding_type
            .to_lowercase()
            .contains(&app.app_type.to_lowercase())
    {
        return true;
    }

    // Finding title mentions the application name.
    if !app.name.is_empty()
        && finding
            .title
            .to_lowercase()
            .contains(&app.name.to_lowercase())
    {
        return true;
    }

    // Application-class finding types associate when they share a host.
    const APP_FINDING_TYPES: [&str; 4] = [
        "web_vulnerability",
        "application_security",
        "cms_vulnerability",
        "framework_issue",
    ];
    if APP_FINDING_TYPES.contains(&finding.finding_type.as_str())
        && app.host_target == Some(finding.target_id)
    {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use serde_json::json;

    fn app(name: &str, app_type: &str, url: &str) -> Application {
        Application::candidate(name, app_type, url)
    }

    fn finding(title: &str, finding_type: &str) -> Finding {
        Finding::candidate(
            title,
            "",
            Severity::Info,
            finding_type,
            crate::models::empty_object(),
        )
    }

    #[test]
    fn associates_by_url_substring() {
        let app = app("GitLab", "gitlab", "https://git.example.com");
        let mut f = finding("exposed endpoint", "http_fingerprint");
        f.details = json!({"url": "https://git.example.com/users/sign_in"});

        assert!(should_associate_with_app(&f, &app));
    }

    #[test]
    fn associates_by_finding_type_containing_app_type() {
        let app = app("WordPress", "wordpress", "");
        let f = finding("login page", "wordpress-login-detect");

        assert!(should_associate_with_app(&f, &app));
    }

    #[test]
    fn associates_by_title_containing_app_name() {
        let app = app("Jira", "jira", "");
        let f = finding("Jira instance discovered", "service_detection");

        assert!(should_associate_with_app(&f, &app));
    }

    #[test]
    fn associates_app_class_findings_by_shared_host() {
        let host = Uuid::new_v4();
        let mut application = app("Drupal", "drupal", "");
        application.host_target = Some(host);

        let mut f = finding("injection", "web_vulnerability");
        f.target_id = host;
        assert!(should_associate_with_app(&f, &application));

        f.target_id = Uuid::new_v4();
        assert!(!should_associate_with_app(&f, &application));
    }

    #[test]
    fn never_overrides_an_existing_association() {
        let app = app("WordPress", "wordpress", "");
        let mut f = finding("login page", "wordpress-login-detect");
        f.application_id = Some(Uuid::new_v4());

        assert!(!should_associate_with_app(&f, &app));
    }

    #[test]
    fn unrelated_findings_stay_unassociated() {
        let app = app("WordPress", "wordpress", "https://blog.example.com");
        let f = finding("open port 22", "port_summary");

        assert!(!should_associate_with_app(&f, &app));
    }
}
