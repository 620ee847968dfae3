//! hearing-sync library interface
//!
//! Synchronizes legislative hearing data from two upstream sources (the
//! official API and committee website scrapes) into one deduplicated
//! store, with circuit breakers per source and a priority scheduler.
//! Source connectors implement [`sources::SourceConnector`] and are
//! injected at startup.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod sources;
pub mod sync;

pub use crate::config::SyncSettings;
pub use crate::error::{ApiError, ApiResult, Result, SyncError};
pub use crate::events::{EventBus, HearingEvent};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::sync::scheduler::SchedulerHandle;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Unified hearing store connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Scheduler control handle (status snapshots, manual triggers)
    pub scheduler: SchedulerHandle,
    pub settings: Arc<SyncSettings>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        scheduler: SchedulerHandle,
        settings: Arc<SyncSettings>,
    ) -> Self {
        Self {
            db,
            event_bus,
            scheduler,
            settings,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::hearing_routes())
        .merge(api::sync_routes())
        .route("/sync/events", get(api::event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
