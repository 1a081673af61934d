use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    bus::{AmqpBus, MessageBus},
    config::Settings,
    database::DatabasePool,
    error::ApiError,
    repositories::{AssetStore, SessionRepository, SqlxSessionRepository},
    services::ScanOrchestrator,
};

pub mod bus;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod scanner;
pub mod services;
pub mod utils;
pub mod worker;

/// Shared application state for the API process.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: AssetStore,
    pub bus: Arc<dyn MessageBus>,
    pub orchestrator: ScanOrchestrator,
    pub sessions: Arc<dyn SessionRepository + Send + Sync>,
    pub pool: Option<DatabasePool>,
}

impl AppState {
    /// Connect to Postgres and the broker and wire up all dependencies.
    pub async fn new(settings: Settings) -> Result<Self, ApiError> {
        let pool = crate::database::create_connection_pool(&settings.database_url).await?;
        let bus: Arc<dyn MessageBus> = Arc::new(AmqpBus::connect(&settings.message_bus_url).await?);
        let store = AssetStore::postgres(pool.clone());
        let sessions: Arc<dyn SessionRepository + Send + Sync> =
            Arc::new(SqlxSessionRepository::new(pool.clone()));

        Ok(Self::with_parts(settings, store, bus, sessions, Some(pool)))
    }

    /// Assemble state from pre-built parts; used by tests with the
    /// in-memory store and bus.
    pub fn with_parts(
        settings: Settings,
        store: AssetStore,
        bus: Arc<dyn MessageBus>,
        sessions: Arc<dyn SessionRepository + Send + Sync>,
        pool: Option<DatabasePool>,
    ) -> Self {
        let orchestrator = ScanOrchestrator::new(store.clone(), bus.clone());
        Self {
            settings: Arc::new(settings),
            store,
            bus,
            orchestrator,
            sessions,
            pool,
        }
    }
}

/// The `/api/v1` surface plus the unauthenticated health endpoint.
pub fn api_router(state: AppState) -> Router {
    use handlers::*;

    let v1 = Router::new()
        // Projects
        .route(
            "/projects",
            post(project_handlers::create_project).get(project_handlers::list_projects),
        )
        .route(
            "/projects/:id",
            get(project_handlers::get_project)
                .put(project_handlers::update_project)
                .delete(project_handlers::delete_project),
        )
        .route("/projects/:id/targets", get(project_handlers::list_project_targets))
        .route("/projects/:id/scans", get(project_handlers::list_project_scans))
        .route(
            "/projects/:id/findings",
            get(project_handlers::list_project_findings),
        )
        .route(
            "/projects/:id/findings/counts",
            get(project_handlers::project_finding_counts),
        )
        .route(
            "/projects/:id/services",
            get(project_handlers::list_project_services),
        )
        .route(
            "/projects/:id/applications",
            get(project_handlers::list_project_applications),
        )
        .route(
            "/projects/:id/dns-records",
            get(project_handlers::list_project_dns_records),
        )
        .route(
            "/projects/:id/certificates",
            get(project_handlers::list_project_certificates),
        )
        // Targets
        .route("/targets", post(target_handlers::create_target))
        .route("/targets/bulk", post(target_handlers::bulk_create_targets))
        .route(
            "/targets/:id",
            get(target_handlers::get_target)
                .put(target_handlers::update_target)
                .delete(target_handlers::delete_target),
        )
        .route(
            "/targets/:id/relations",
            get(target_handlers::list_target_relations),
        )
        .route(
            "/targets/:id/services",
            get(service_handlers::list_target_services),
        )
        // Scans
        .route(
            "/scans",
            post(scan_handlers::start_scan).get(scan_handlers::list_scans),
        )
        .route("/scans/:id", get(scan_handlers::get_scan))
        .route("/scans/:id/cancel", post(scan_handlers::cancel_scan))
        .route("/scans/:id/findings", get(scan_handlers::get_scan_findings))
        .route("/scans/:id/tasks", get(scan_handlers::get_scan_tasks))
        // Scan configurations
        .route(
            "/scan-configs",
            post(scan_handlers::create_scan_config).get(scan_handlers::list_scan_configs),
        )
        .route(
            "/scan-configs/:id",
            get(scan_handlers::get_scan_config)
                .put(scan_handlers::update_scan_config)
                .delete(scan_handlers::delete_scan_config),
        )
        // Findings
        .route(
            "/findings",
            post(finding_handlers::create_finding).get(finding_handlers::list_findings),
        )
        .route(
            "/findings/bulk-update",
            post(finding_handlers::bulk_update_findings),
        )
        .route(
            "/findings/:id",
            get(finding_handlers::get_finding).delete(finding_handlers::delete_finding),
        )
        // Services
        .route("/services", post(service_handlers::create_service))
        .route(
            "/services/:id",
            get(service_handlers::get_service).delete(service_handlers::delete_service),
        )
        // Applications
        .route("/applications", post(application_handlers::create_application))
        .route(
            "/applications/:id",
            get(application_handlers::get_application)
                .delete(application_handlers::delete_application),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    Router::new()
        .route("/api/health", get(handlers::health_check))
        .nest("/api/v1", v1)
        .layer(axum::middleware::from_fn(
            middleware::request_logging_middleware,
        ))
        .layer(middleware::create_cors_layer(
            state.settings.cors_allow_origins.clone(),
        ))
        .with_state(state)
}
