use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use uuid::Uuid;

use perimeter::{
    bus::AmqpBus,
    config, database, middleware,
    repositories::AssetStore,
    scanner,
    worker::{Worker, WorkerConfig},
};

/// Scan worker: consumes scan jobs from the bus and drives the external
/// reconnaissance tools.
#[derive(Debug, Parser)]
#[command(name = "perimeter-worker", version)]
struct Args {
    /// Worker identifier; defaults to <hostname>-<short uuid>
    #[arg(long, env = "WORKER_ID")]
    id: Option<String>,

    /// Message bus URL
    #[arg(long, env = "MESSAGE_BUS_URL")]
    bus: Option<String>,

    /// Database URL
    #[arg(long, env = "DATABASE_URL")]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut settings = config::Settings::new()?;
    if let Some(bus_url) = args.bus {
        settings.message_bus_url = bus_url;
    }
    if let Some(db_url) = args.db {
        settings.database_url = db_url;
    }

    middleware::init_logging(&settings.log_level, &settings.log_format)?;

    let worker_id = args.id.unwrap_or_else(|| {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "worker".to_string());
        format!("{}-{}", host, &Uuid::new_v4().to_string()[..8])
    });

    tracing::info!(
        worker_id = %worker_id,
        "Starting perimeter worker v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = database::create_connection_pool(&settings.database_url).await?;
    let store = AssetStore::postgres(pool);
    let bus = Arc::new(AmqpBus::connect(&settings.message_bus_url).await?);

    let registry = Arc::new(scanner::default_registry(&settings));
    tracing::info!(scanners = ?registry.names(), "scanner registry initialized");

    let worker = Worker::new(
        worker_id,
        bus,
        store,
        registry,
        WorkerConfig {
            unit_timeout: Duration::from_secs(settings.scan_unit_timeout_secs),
            scan_prefetch: settings.scan_prefetch,
            ingest_prefetch: settings.ingest_prefetch,
        },
    );

    worker.run().await?;

    Ok(())
}
