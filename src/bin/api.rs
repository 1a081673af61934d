use std::net::SocketAddr;

use tokio::signal;

use perimeter::{
    api_router, config, middleware,
    services::{spawn_api_consumers, IngestService},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = config::Settings::new()?;

    middleware::init_logging(&settings.log_level, &settings.log_format)?;

    tracing::info!("Starting perimeter API v{}", env!("CARGO_PKG_VERSION"));

    let port = settings.port;
    let ingest_prefetch = settings.ingest_prefetch;

    let state = AppState::new(settings).await?;

    // Ingestion consumers: status, findings, and the shared asset queues.
    let ingest = IngestService::new(state.store.clone());
    let consumers = spawn_api_consumers(state.bus.clone(), ingest, ingest_prefetch);

    let app = api_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for consumer in consumers {
        consumer.abort();
    }

    tracing::info!("API shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
