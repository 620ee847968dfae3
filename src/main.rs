//! hearing-sync - Hearing Synchronization & Deduplication Service
//!
//! Reconciles legislative hearing data from the official API and
//! committee website scrapes into one canonical store, then exposes a
//! status/query HTTP surface and an SSE feed of committed changes.
//!
//! Source connectors are provided by the embedding deployment through
//! the library API; the standalone binary starts with an empty connector
//! set and serves queries over previously synced data.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hearing_sync::events::EventBus;
use hearing_sync::sources::{ApiRateLimiter, SiteRateLimiter, SourceConnector};
use hearing_sync::sync::orchestrator::SyncOrchestrator;
use hearing_sync::sync::scheduler::SyncScheduler;
use hearing_sync::{AppState, SyncSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting hearing-sync service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let settings = Arc::new(SyncSettings::load(config_path.as_deref())?);
    info!("Database: {}", settings.database_path.display());

    let db_pool = hearing_sync::db::init_database_pool(&settings.database_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(settings.event_capacity);
    let cancel = CancellationToken::new();

    // Connectors come from the embedding system; the standalone binary
    // schedules cycles over an empty set, which keeps status and queries
    // live but discovers nothing.
    let connectors: Vec<Arc<dyn SourceConnector>> = Vec::new();
    if connectors.is_empty() {
        warn!("No source connectors registered; sync cycles will discover nothing");
    }

    let orchestrator = Arc::new(SyncOrchestrator::new(
        db_pool.clone(),
        event_bus.clone(),
        &settings,
        connectors,
        Arc::new(ApiRateLimiter::new(settings.api_requests_per_second)),
        Arc::new(SiteRateLimiter::new(std::time::Duration::from_millis(
            settings.website_min_interval_ms,
        ))),
        cancel.clone(),
    ));

    let scheduler = SyncScheduler::new(
        db_pool.clone(),
        orchestrator,
        settings.worker_pool_size,
        std::time::Duration::from_secs(settings.tick_interval_secs),
        cancel.clone(),
    );
    let handle = scheduler.handle();
    let scheduler_task = tokio::spawn(scheduler.run());
    info!("Scheduler started");

    let state = AppState::new(db_pool, event_bus, handle, settings.clone());
    let app = hearing_sync::build_router(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Listening on http://{}", settings.bind_addr);
    info!("Health check: http://{}/health", settings.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    scheduler_task.await?;
    info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, cancelling in-flight sync work first.
async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
    cancel.cancel();
}
