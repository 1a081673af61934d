use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    bus::{publish_json, CancelRequest, MessageBus, Queue, ScanJob, StatusUpdate},
    error::ApiError,
    models::{ScanStatus, ScanTask, Service, Target},
    scanner::{ScanError, ScannerRegistry},
    services::{spawn_asset_consumers, IngestService, ResultStitcher, StitchSummary},
    repositories::AssetStore,
};

/// Tunables the worker picks up from settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub unit_timeout: Duration,
    pub scan_prefetch: u16,
    pub ingest_prefetch: u16,
}

/// A stateless scan executor. Reserves one scan job at a time (prefetch 1),
/// drives the scanner over targets and services sequentially, and streams
/// discovered assets back through the bus. Parallelism comes from running
/// many workers.
pub struct Worker {
    worker_id: String,
    bus: Arc<dyn MessageBus>,
    store: AssetStore,
    registry: Arc<ScannerRegistry>,
    stitcher: ResultStitcher,
    ingest: IngestService,
    config: WorkerConfig,
    active_scans: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl Worker {
    pub fn new(
        worker_id: String,
        bus: Arc<dyn MessageBus>,
        store: AssetStore,
        registry: Arc<ScannerRegistry>,
        config: WorkerConfig,
    ) -> Arc<Self> {
        let stitcher = ResultStitcher::new(store.clone(), bus.clone());
        let ingest = IngestService::new(store.clone());

        Arc::new(Self {
            worker_id,
            bus,
            store,
            registry,
            stitcher,
            ingest,
            config,
            active_scans: Mutex::new(HashMap::new()),
        })
    }

    /// Subscribe to cancel and the asset queues, then block on the scan
    /// queue until the bus closes.
    pub async fn run(self: Arc<Self>) -> Result<(), ApiError> {
        tracing::info!(worker_id = %self.worker_id, "worker starting");

        let cancel_worker = self.clone();
        crate::bus::spawn_json_consumer(
            self.bus.clone(),
            Queue::Cancel,
            self.config.ingest_prefetch,
            move |request: CancelRequest| {
                let worker = cancel_worker.clone();
                async move {
                    worker.handle_cancel(request);
                    Ok(())
                }
            },
        );

        spawn_asset_consumers(
            self.bus.clone(),
            self.ingest.clone(),
            self.config.ingest_prefetch,
        );

        let mut stream = self
            .bus
            .subscribe(Queue::Scan, self.config.scan_prefetch)
            .await?;

        tracing::info!(worker_id = %self.worker_id, "worker ready and waiting for scan requests");

        while let Some(delivery) = stream.next().await {
            let job: ScanJob = match serde_json::from_slice(&delivery.body) {
                Ok(job) => job,
                Err(e) => {
                    tracing::warn!(
                        worker_id = %self.worker_id,
                        error = %e,
                        "discarding unparseable scan job"
                    );
                    if let Err(e) = delivery.nack(false).await {
                        tracing::warn!(error = %e, "nack failed");
                    }
                    continue;
                }
            };

            match self.handle_scan_job(job).await {
                Ok(()) => {
                    if let Err(e) = delivery.ack().await {
                        tracing::warn!(error = %e, "ack failed");
                    }
                }
                Err(e) => {
                    tracing::error!(
                        worker_id = %self.worker_id,
                        error = %e,
                        "scan job failed on infrastructure error, requeueing"
                    );
                    if let Err(e) = delivery.nack(true).await {
                        tracing::warn!(error = %e, "nack failed");
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.worker_id, "scan queue closed, worker stopping");
        Ok(())
    }

    /// Process one scan job. `Ok` means the message is consumed, including
    /// scanner failures and cancellations (the scan row carries the
    /// outcome); `Err` is reserved for infrastructure failures worth a
    /// redelivery.
    pub async fn handle_scan_job(&self, job: ScanJob) -> Result<(), ApiError> {
        let scan_id = job.scan_id;
        tracing::info!(
            worker_id = %self.worker_id,
            scan_id = %scan_id,
            scanner_type = %job.scanner_type,
            "processing scan request"
        );

        // A cancel may have landed while the job sat in the queue; the
        // orchestrator already moved the row to a terminal state.
        if let Some(scan) = self.store.scans.get_by_id(&scan_id).await? {
            if scan.status.is_terminal() {
                tracing::info!(
                    worker_id = %self.worker_id,
                    scan_id = %scan_id,
                    status = %scan.status,
                    "dropping scan job already in a terminal state"
                );
                return Ok(());
            }
        }

        self.publish_status(
            scan_id,
            ScanStatus::Running,
            format!(
                "Started {} scan on worker {}",
                job.scanner_type, self.worker_id
            ),
        )
        .await?;

        let Some(scanner) = self.registry.get(&job.scanner_type) else {
            let message = format!("Scanner not found: {}", job.scanner_type);
            tracing::warn!(worker_id = %self.worker_id, scan_id = %scan_id, "{message}");
            self.publish_status(scan_id, ScanStatus::Failed, message)
                .await?;
            return Ok(());
        };

        let token = CancellationToken::new();
        self.active_scans
            .lock()
            .unwrap()
            .insert(scan_id, token.clone());

        let outcome = self.drive_scan(&job, scanner.as_ref(), &token).await;

        self.active_scans.lock().unwrap().remove(&scan_id);

        outcome
    }

    async fn drive_scan(
        &self,
        job: &ScanJob,
        scanner: &dyn crate::scanner::Scanner,
        token: &CancellationToken,
    ) -> Result<(), ApiError> {
        let scan_id = job.scan_id;
        let started = Instant::now();

        if let Err(e) = scanner.initialize().await {
            let message = format!("Failed to initialize scanner: {e}");
            tracing::warn!(worker_id = %self.worker_id, scan_id = %scan_id, "{message}");
            self.publish_status(scan_id, ScanStatus::Failed, message)
                .await?;
            return Ok(());
        }

        let mut summary = StitchSummary::default();

        if scanner.supports_services() && !job.services.is_empty() {
            for (index, service) in job.services.iter().enumerate() {
                if token.is_cancelled() {
                    tracing::info!(worker_id = %self.worker_id, scan_id = %scan_id, "scan was cancelled");
                    return Ok(());
                }

                let Some(host) = self.store.targets.get_by_id(&service.target_id).await? else {
                    tracing::warn!(
                        scan_id = %scan_id,
                        service_id = %service.id,
                        "skipping service whose target no longer exists"
                    );
                    continue;
                };

                self.publish_status(
                    scan_id,
                    ScanStatus::Running,
                    format!(
                        "Scanning service {}/{}: {}:{}",
                        index + 1,
                        job.services.len(),
                        service.service_name,
                        service.port
                    ),
                )
                .await?;

                if self
                    .scan_unit(job, scanner, token, &host, Some(service), &mut summary)
                    .await?
                {
                    return Ok(());
                }
            }
        }

        for (index, target) in job.targets.iter().enumerate() {
            if token.is_cancelled() {
                tracing::info!(worker_id = %self.worker_id, scan_id = %scan_id, "scan was cancelled");
                return Ok(());
            }

            if !scanner.supports_target_kind(target.kind) {
                tracing::debug!(
                    scan_id = %scan_id,
                    kind = %target.kind,
                    scanner = %job.scanner_type,
                    "scanner does not support target kind, skipping"
                );
                continue;
            }

            self.publish_status(
                scan_id,
                ScanStatus::Running,
                format!(
                    "Scanning target {}/{}: {}",
                    index + 1,
                    job.targets.len(),
                    target.value
                ),
            )
            .await?;

            if self
                .scan_unit(job, scanner, token, target, None, &mut summary)
                .await?
            {
                return Ok(());
            }
        }

        let elapsed = started.elapsed();
        let message = format!(
            "Completed {} scan in {:.1?}. Found: {} findings, {} new targets, {} relations, {} services",
            job.scanner_type,
            elapsed,
            summary.findings,
            summary.new_targets,
            summary.relations,
            summary.services
        );
        self.publish_status(scan_id, ScanStatus::Completed, message)
            .await?;

        tracing::info!(
            worker_id = %self.worker_id,
            scan_id = %scan_id,
            elapsed = ?elapsed,
            "scan completed"
        );

        Ok(())
    }

    /// Scan a single target or service. Returns `Ok(true)` when the scan was
    /// cancelled and processing must stop.
    async fn scan_unit(
        &self,
        job: &ScanJob,
        scanner: &dyn crate::scanner::Scanner,
        token: &CancellationToken,
        host: &Target,
        service: Option<&Service>,
        summary: &mut StitchSummary,
    ) -> Result<bool, ApiError> {
        let input = match service {
            Some(service) => scanner.adapt_service(service, host),
            None => scanner.adapt_target(host),
        };
        let Some(input) = input else {
            return Ok(false);
        };

        let task = self.record_task_start(job, &input, service.is_some()).await;

        let unit = tokio::time::timeout(
            self.config.unit_timeout,
            scanner.scan(token, &input, &job.parameters),
        )
        .await;

        let results = match unit {
            Err(_) => {
                tracing::warn!(
                    scan_id = %job.scan_id,
                    unit = %input.value,
                    "scan unit exceeded its deadline"
                );
                self.record_task_end(&task, ScanStatus::Failed, "deadline exceeded")
                    .await;
                return Ok(token.is_cancelled());
            }
            Ok(Err(ScanError::Cancelled)) => {
                tracing::info!(
                    worker_id = %self.worker_id,
                    scan_id = %job.scan_id,
                    "scan was cancelled"
                );
                self.record_task_end(&task, ScanStatus::Cancelled, "cancelled")
                    .await;
                return Ok(true);
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    scan_id = %job.scan_id,
                    unit = %input.value,
                    error = %e,
                    "scan unit failed, continuing with remaining units"
                );
                self.record_task_end(&task, ScanStatus::Failed, &e.to_string())
                    .await;
                return Ok(token.is_cancelled());
            }
            Ok(Ok(results)) => results,
        };

        match self
            .stitcher
            .process(job.scan_id, host, service, results)
            .await
        {
            Ok(unit_summary) => {
                summary.accumulate(unit_summary);
                self.record_task_end(&task, ScanStatus::Completed, "ok").await;
            }
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    scan_id = %job.scan_id,
                    unit = %input.value,
                    error = %e,
                    "failed to stitch scan results"
                );
                self.record_task_end(&task, ScanStatus::Failed, &e.to_string())
                    .await;
            }
        }

        Ok(token.is_cancelled())
    }

    /// Per-unit progress row; task bookkeeping never fails a scan.
    async fn record_task_start(
        &self,
        job: &ScanJob,
        input: &crate::scanner::ScanInput,
        is_service: bool,
    ) -> Option<ScanTask> {
        let task = ScanTask {
            id: Uuid::new_v4(),
            scan_id: job.scan_id,
            task_type: if is_service {
                format!("{}_service", job.scanner_type)
            } else {
                format!("{}_target", job.scanner_type)
            },
            parameters: serde_json::json!({
                "value": input.value,
                "port": input.port,
            }),
            status: ScanStatus::Running,
            result: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        match self.store.scans.create_task(&task).await {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::debug!(scan_id = %job.scan_id, error = %e, "failed to record scan task");
                None
            }
        }
    }

    async fn record_task_end(&self, task: &Option<ScanTask>, status: ScanStatus, note: &str) {
        if let Some(task) = task {
            let result = serde_json::json!({"note": note});
            if let Err(e) = self
                .store
                .scans
                .update_task_status(&task.id, status, Some(result))
                .await
            {
                tracing::debug!(task_id = %task.id, error = %e, "failed to update scan task");
            }
        }
    }

    /// Fire the cancel handle for a scan this worker owns; cancellations for
    /// unknown scans are logged and dropped.
    pub fn handle_cancel(&self, request: CancelRequest) {
        tracing::info!(
            worker_id = %self.worker_id,
            scan_id = %request.scan_id,
            "received cancellation request"
        );

        let token = self.active_scans.lock().unwrap().remove(&request.scan_id);
        match token {
            Some(token) => {
                token.cancel();
                tracing::info!(
                    worker_id = %self.worker_id,
                    scan_id = %request.scan_id,
                    "cancelled scan"
                );
            }
            None => {
                tracing::info!(
                    worker_id = %self.worker_id,
                    scan_id = %request.scan_id,
                    "no active scan with this id"
                );
            }
        }
    }

    async fn publish_status(
        &self,
        scan_id: Uuid,
        status: ScanStatus,
        message: String,
    ) -> Result<(), ApiError> {
        publish_json(
            self.bus.as_ref(),
            Queue::Status,
            &StatusUpdate {
                scan_id,
                status,
                message,
            },
        )
        .await?;
        Ok(())
    }
}
