//! Scheduler status and manual trigger endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::CircuitBreakerState;
use crate::sync::scheduler::CommitteeStatus;
use crate::AppState;

/// One committee's scheduler view plus its breaker positions
#[derive(Debug, Serialize)]
pub struct CommitteeSyncStatus {
    #[serde(flatten)]
    pub scheduler: CommitteeStatus,
    pub breakers: Vec<CircuitBreakerState>,
}

/// GET /sync/status
pub async fn sync_status(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<CommitteeSyncStatus>>> {
    let mut statuses = Vec::new();
    for scheduler in state.scheduler.status().await {
        let breakers =
            db::breakers::load_for_committee(&state.db, &scheduler.committee_code).await?;
        statuses.push(CommitteeSyncStatus { scheduler, breakers });
    }
    Ok(Json(statuses))
}

/// GET /sync/status/{committee_code}
pub async fn committee_sync_status(
    State(state): State<AppState>,
    Path(committee_code): Path<String>,
) -> ApiResult<Json<CommitteeSyncStatus>> {
    let scheduler = state
        .scheduler
        .committee_status(&committee_code)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("committee {}", committee_code)))?;
    let breakers = db::breakers::load_for_committee(&state.db, &committee_code).await?;
    Ok(Json(CommitteeSyncStatus { scheduler, breakers }))
}

/// POST /sync/trigger/{committee_code}
///
/// Queues an immediate cycle. 202: queued; the cycle itself runs on the
/// worker pool and reports through /sync/status and the event stream.
pub async fn trigger_sync(
    State(state): State<AppState>,
    Path(committee_code): Path<String>,
) -> ApiResult<StatusCode> {
    if db::sync_config::get_config(&state.db, &committee_code)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(format!("committee {}", committee_code)));
    }

    state.scheduler.trigger(&committee_code).await?;
    tracing::info!(committee = %committee_code, "Manual sync queued via API");
    Ok(StatusCode::ACCEPTED)
}

/// Build sync control routes
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/sync/status", get(sync_status))
        .route("/sync/status/:committee_code", get(committee_sync_status))
        .route("/sync/trigger/:committee_code", post(trigger_sync))
}
