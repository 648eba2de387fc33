//! Opine server binary.

use std::sync::Arc;

use opine_core::AppConfig;
use opine_server::{app, AppState};
use opine_workers::WorkerPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    opine_server::logging::init(&config.log)?;

    tracing::info!("Opine v{}", env!("CARGO_PKG_VERSION"));

    let bind_addr = config.bind_addr;
    let workers_per_queue = config.workers_per_queue;
    let (state, stage_context) = AppState::from_config(config).await?;

    // Enrichment workers run in-process alongside the HTTP surface.
    let mut workers = WorkerPool::new(
        Arc::clone(&state.queue),
        Arc::new(stage_context),
        workers_per_queue,
    );
    workers.start();
    tracing::info!(workers_per_queue, "enrichment workers started");

    let router = app(state).into_make_service_with_connect_info::<std::net::SocketAddr>();
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("http surface drained, stopping workers");
    workers.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
