//! Hearing query endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::db;
use crate::db::hearings::HearingFilter;
use crate::error::{ApiError, ApiResult};
use crate::models::{ReviewStatus, SyncHistoryEntry, UnifiedHearing};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HearingQuery {
    /// Filter on review status: matched, needs_review, stale
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// GET /hearings/{committee_code}
pub async fn list_hearings(
    State(state): State<AppState>,
    Path(committee_code): Path<String>,
    Query(query): Query<HearingQuery>,
) -> ApiResult<Json<Vec<UnifiedHearing>>> {
    let review_status = match query.status.as_deref() {
        Some(s) => Some(
            ReviewStatus::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown review status: {}", s)))?,
        ),
        None => None,
    };

    let filter = HearingFilter {
        review_status,
        from: query.from,
        to: query.to,
    };

    let hearings = db::hearings::list_by_committee(&state.db, &committee_code, &filter).await?;
    Ok(Json(hearings))
}

/// GET /hearing/{id}
pub async fn get_hearing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UnifiedHearing>> {
    let hearing = db::hearings::get_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("hearing {}", id)))?;
    Ok(Json(hearing))
}

/// GET /hearing/{id}/history
pub async fn get_hearing_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<SyncHistoryEntry>>> {
    if db::hearings::get_by_id(&state.db, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("hearing {}", id)));
    }
    let entries = db::history::list_for_hearing(&state.db, id).await?;
    Ok(Json(entries))
}

/// POST /hearing/{id}/supersede
///
/// Review resolution: a human adjudicator decided the flagged row
/// duplicates another hearing. The row is marked stale, which removes it
/// from future candidate sets while preserving it for audit continuity.
pub async fn supersede_hearing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if db::hearings::get_by_id(&state.db, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("hearing {}", id)));
    }
    db::hearings::mark_stale(&state.db, id).await?;
    tracing::info!(hearing_id = %id, "Hearing marked stale via review resolution");
    Ok(StatusCode::NO_CONTENT)
}

/// Build hearing query routes
pub fn hearing_routes() -> Router<AppState> {
    Router::new()
        .route("/hearings/:committee_code", get(list_hearings))
        .route("/hearing/:id", get(get_hearing))
        .route("/hearing/:id/history", get(get_hearing_history))
        .route("/hearing/:id/supersede", post(supersede_hearing))
}
