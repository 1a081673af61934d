use std::sync::Arc;

use uuid::Uuid;

use crate::{
    bus::{publish_json, CancelRequest, MessageBus, Queue, ScanJob},
    error::ApiError,
    models::{Scan, ScanStatus, Service, StartScanInput, Target},
    repositories::AssetStore,
};

/// API-side scan orchestration: validates a scan request, materializes the
/// pending Scan row, and hands the job to the workers through the bus.
/// Cancellation is best-effort: flip the row, publish `cancel`, return.
#[derive(Clone)]
pub struct ScanOrchestrator {
    store: AssetStore,
    bus: Arc<dyn MessageBus>,
}

impl ScanOrchestrator {
    pub fn new(store: AssetStore, bus: Arc<dyn MessageBus>) -> Self {
        Self { store, bus }
    }

    pub async fn start_scan(&self, input: StartScanInput) -> Result<Scan, ApiError> {
        let project = self
            .store
            .projects
            .get_by_id(&input.project_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

        let scan_config = self
            .store
            .scan_configs
            .get_by_id(&input.scan_config_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Scan configuration not found".to_string()))?;

        let targets = self.resolve_targets(&project.id, &input.target_ids).await?;
        let services = self.resolve_services(&project.id, &input.service_ids).await?;

        if targets.is_empty() && services.is_empty() {
            return Err(ApiError::validation(
                "No valid targets found for scanning",
            ));
        }

        let scan = self.store.scans.create(&project.id, &scan_config.id).await?;

        let job = ScanJob {
            scan_id: scan.id,
            scanner_type: scan_config.scanner_type.clone(),
            targets,
            services,
            parameters: scan_config.parameters.clone(),
        };
        publish_json(self.bus.as_ref(), Queue::Scan, &job).await?;

        tracing::info!(
            scan_id = %scan.id,
            scanner_type = %scan_config.scanner_type,
            targets = job.targets.len(),
            services = job.services.len(),
            "queued scan"
        );

        Ok(scan)
    }

    /// Valid only from `pending` or `running`; cancelling an already
    /// cancelled scan is a no-op.
    pub async fn cancel_scan(&self, scan_id: &Uuid) -> Result<(), ApiError> {
        let scan = self
            .store
            .scans
            .get_by_id(scan_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Scan not found".to_string()))?;

        match scan.status {
            ScanStatus::Cancelled => return Ok(()),
            ScanStatus::Pending | ScanStatus::Running => {}
            ScanStatus::Completed | ScanStatus::Failed => {
                return Err(ApiError::validation(
                    "Can only cancel pending or running scans",
                ));
            }
        }

        self.store
            .scans
            .update_status(scan_id, ScanStatus::Cancelled, "cancelled by user")
            .await?;

        publish_json(
            self.bus.as_ref(),
            Queue::Cancel,
            &CancelRequest { scan_id: *scan_id },
        )
        .await?;

        tracing::info!(scan_id = %scan_id, "cancellation requested");

        Ok(())
    }

    /// All project targets when no ids are given; otherwise the requested
    /// ids intersected with the project's targets.
    async fn resolve_targets(
        &self,
        project_id: &Uuid,
        target_ids: &[Uuid],
    ) -> Result<Vec<Target>, ApiError> {
        if target_ids.is_empty() {
            return self.store.targets.list_by_project(project_id).await;
        }

        let mut targets = Vec::with_capacity(target_ids.len());
        for id in target_ids {
            match self.store.targets.get_by_id(id).await? {
                Some(target) if target.project_id == *project_id => targets.push(target),
                Some(_) => {
                    tracing::warn!(target_id = %id, "skipping target outside the project");
                }
                None => {
                    tracing::warn!(target_id = %id, "skipping unknown target");
                }
            }
        }
        Ok(targets)
    }

    async fn resolve_services(
        &self,
        project_id: &Uuid,
        service_ids: &[Uuid],
    ) -> Result<Vec<Service>, ApiError> {
        let mut services = Vec::with_capacity(service_ids.len());
        for id in service_ids {
            let Some(service) = self.store.services.get_by_id(id).await? else {
                tracing::warn!(service_id = %id, "skipping unknown service");
                continue;
            };

            match self.store.targets.get_by_id(&service.target_id).await? {
                Some(target) if target.project_id == *project_id => services.push(service),
                _ => {
                    tracing::warn!(service_id = %id, "skipping service outside the project");
                }
            }
        }
        Ok(services)
    }
}
