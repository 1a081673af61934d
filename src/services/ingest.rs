use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    bus::{spawn_json_consumer, MessageBus, Queue, StatusUpdate},
    error::ApiError,
    models::{Finding, Service, Target, TargetRelation},
    repositories::AssetStore,
};

/// Idempotent persistence of asset messages coming off the bus.
///
/// Every handler upserts by natural key, so redelivery and cross-queue
/// races converge on the same graph state.
#[derive(Clone)]
pub struct IngestService {
    store: AssetStore,
}

impl IngestService {
    pub fn new(store: AssetStore) -> Self {
        Self { store }
    }

    /// Apply a scan status update through the state machine. Writes that
    /// would cross a terminal boundary are dropped; a terminal-to-different-
    /// terminal attempt is logged as an inconsistency.
    pub async fn handle_status(&self, update: StatusUpdate) -> Result<(), ApiError> {
        let Some(scan) = self.store.scans.get_by_id(&update.scan_id).await? else {
            return Err(ApiError::NotFound(format!(
                "Scan {} not found for status update",
                update.scan_id
            )));
        };

        let applied = self
            .store
            .scans
            .update_status(&update.scan_id, update.status, &update.message)
            .await?;

        if !applied {
            if scan.status.is_terminal()
                && update.status.is_terminal()
                && scan.status != update.status
            {
                tracing::warn!(
                    scan_id = %update.scan_id,
                    current = %scan.status,
                    incoming = %update.status,
                    "inconsistent terminal status update dropped"
                );
            } else {
                tracing::debug!(
                    scan_id = %update.scan_id,
                    current = %scan.status,
                    incoming = %update.status,
                    "status update dropped by state machine"
                );
            }
        }

        Ok(())
    }

    pub async fn handle_target(&self, target: Target) -> Result<(), ApiError> {
        if target.project_id.is_nil() {
            return Err(ApiError::validation("target message without project_id"));
        }

        let stored = self.store.targets.upsert(&target).await?;
        tracing::debug!(
            value = %stored.value,
            kind = %stored.kind,
            id = %stored.id,
            "target upserted"
        );
        Ok(())
    }

    /// Both endpoints must exist at insertion time; otherwise the relation
    /// is discarded with a warning. There is no cross-queue ordering, so a
    /// relation can overtake its endpoint on the targets queue; the check is
    /// deferred briefly to let in-flight targets land before giving up.
    pub async fn handle_relation(&self, relation: TargetRelation) -> Result<(), ApiError> {
        let mut endpoints_exist = false;
        for attempt in 0..4 {
            if attempt > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(50u64 << attempt)).await;
            }

            let source = self.store.targets.get_by_id(&relation.source_id).await?;
            let destination = self
                .store
                .targets
                .get_by_id(&relation.destination_id)
                .await?;

            if source.is_some() && destination.is_some() {
                endpoints_exist = true;
                break;
            }
        }

        if !endpoints_exist {
            tracing::warn!(
                source = %relation.source_id,
                destination = %relation.destination_id,
                kind = %relation.kind,
                "discarding relation: source or destination target does not exist"
            );
            return Ok(());
        }

        self.store.relations.upsert(&relation).await?;
        tracing::debug!(
            source = %relation.source_id,
            destination = %relation.destination_id,
            kind = %relation.kind,
            "relation upserted"
        );
        Ok(())
    }

    pub async fn handle_service(&self, service: Service) -> Result<(), ApiError> {
        if service.target_id.is_nil() {
            return Err(ApiError::validation("service message without target_id"));
        }

        let stored = self.store.services.upsert(&service).await?;
        tracing::debug!(
            target_id = %stored.target_id,
            port = stored.port,
            protocol = %stored.protocol,
            "service upserted"
        );
        Ok(())
    }

    pub async fn handle_finding(&self, finding: Finding) -> Result<(), ApiError> {
        if finding.target_id.is_nil() {
            return Err(ApiError::validation("finding message without target_id"));
        }

        let stored = self.store.findings.upsert(&finding).await?;
        tracing::debug!(
            id = %stored.id,
            finding_type = %stored.finding_type,
            severity = %stored.severity,
            "finding upserted"
        );
        Ok(())
    }
}

/// Spawn the asset ingestion consumers shared by both roles: targets,
/// relations, services.
pub fn spawn_asset_consumers(
    bus: Arc<dyn MessageBus>,
    ingest: IngestService,
    prefetch: u16,
) -> Vec<JoinHandle<()>> {
    let targets_ingest = ingest.clone();
    let relations_ingest = ingest.clone();
    let services_ingest = ingest;

    vec![
        spawn_json_consumer(bus.clone(), Queue::Targets, prefetch, move |target| {
            let ingest = targets_ingest.clone();
            async move { ingest.handle_target(target).await }
        }),
        spawn_json_consumer(bus.clone(), Queue::Relations, prefetch, move |relation| {
            let ingest = relations_ingest.clone();
            async move { ingest.handle_relation(relation).await }
        }),
        spawn_json_consumer(bus, Queue::Services, prefetch, move |service| {
            let ingest = services_ingest.clone();
            async move { ingest.handle_service(service).await }
        }),
    ]
}

/// Spawn the API-side ingestion consumers: status and findings on top of the
/// shared asset consumers.
pub fn spawn_api_consumers(
    bus: Arc<dyn MessageBus>,
    ingest: IngestService,
    prefetch: u16,
) -> Vec<JoinHandle<()>> {
    let status_ingest = ingest.clone();
    let findings_ingest = ingest.clone();

    let mut handles = vec![
        spawn_json_consumer(bus.clone(), Queue::Status, prefetch, move |update| {
            let ingest = status_ingest.clone();
            async move { ingest.handle_status(update).await }
        }),
        spawn_json_consumer(bus.clone(), Queue::Findings, prefetch, move |finding| {
            let ingest = findings_ingest.clone();
            async move { ingest.handle_finding(finding).await }
        }),
    ];
    handles.extend(spawn_asset_consumers(bus, ingest, prefetch));
    handles
}
