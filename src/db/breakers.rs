//! Circuit breaker state persistence
//!
//! State survives restarts so an open breaker stays open across a service
//! bounce instead of hammering a failing source again.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::{Result, SyncError};
use crate::models::{BreakerState, CircuitBreakerState, SourceType};

/// Load breaker state for a (committee, source) pair, defaulting to a
/// fresh closed breaker when none is persisted yet.
pub async fn load_breaker(
    pool: &SqlitePool,
    committee_code: &str,
    source: SourceType,
) -> Result<CircuitBreakerState> {
    let row = sqlx::query("SELECT * FROM circuit_breakers WHERE committee_code = ? AND source = ?")
        .bind(committee_code)
        .bind(source.as_str())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => breaker_from_row(&row),
        None => Ok(CircuitBreakerState::new(committee_code, source)),
    }
}

/// Persist breaker state.
pub async fn save_breaker(pool: &SqlitePool, state: &CircuitBreakerState) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO circuit_breakers (
            committee_code, source, consecutive_failures, state, open_until, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(committee_code, source) DO UPDATE SET
            consecutive_failures = excluded.consecutive_failures,
            state = excluded.state,
            open_until = excluded.open_until,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&state.committee_code)
    .bind(state.source.as_str())
    .bind(state.consecutive_failures as i64)
    .bind(state.state.as_str())
    .bind(state.open_until.map(|t| t.to_rfc3339()))
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// All breaker states for one committee, for the status surface.
pub async fn load_for_committee(
    pool: &SqlitePool,
    committee_code: &str,
) -> Result<Vec<CircuitBreakerState>> {
    let rows = sqlx::query("SELECT * FROM circuit_breakers WHERE committee_code = ? ORDER BY source")
        .bind(committee_code)
        .fetch_all(pool)
        .await?;

    rows.iter().map(breaker_from_row).collect()
}

fn breaker_from_row(row: &SqliteRow) -> Result<CircuitBreakerState> {
    let source_str: String = row.get("source");
    let source = SourceType::parse(&source_str)
        .ok_or_else(|| SyncError::Internal(format!("unknown source: {}", source_str)))?;

    let state_str: String = row.get("state");
    let state = BreakerState::parse(&state_str)
        .ok_or_else(|| SyncError::Internal(format!("unknown breaker state: {}", state_str)))?;

    let open_until: Option<String> = row.get("open_until");
    let open_until = open_until
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| SyncError::Internal(format!("parse open_until: {}", e)))?
        .map(|t| t.with_timezone(&chrono::Utc));

    Ok(CircuitBreakerState {
        committee_code: row.get("committee_code"),
        source,
        consecutive_failures: row.get::<i64, _>("consecutive_failures") as u32,
        state,
        open_until,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn missing_breaker_defaults_to_closed() {
        let pool = crate::db::test_pool().await;
        let state = load_breaker(&pool, "SSJU", SourceType::Api).await.unwrap();
        assert_eq!(state.state, BreakerState::Closed);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.open_until.is_none());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let pool = crate::db::test_pool().await;
        let open_until = Utc::now() + Duration::hours(2);

        let state = CircuitBreakerState {
            committee_code: "SCOM".into(),
            source: SourceType::Api,
            consecutive_failures: 5,
            state: BreakerState::Open,
            open_until: Some(open_until),
        };
        save_breaker(&pool, &state).await.unwrap();

        let loaded = load_breaker(&pool, "SCOM", SourceType::Api).await.unwrap();
        assert_eq!(loaded.state, BreakerState::Open);
        assert_eq!(loaded.consecutive_failures, 5);
        assert_eq!(
            loaded.open_until.unwrap().timestamp(),
            open_until.timestamp()
        );

        // Website breaker for the same committee is independent
        let website = load_breaker(&pool, "SCOM", SourceType::Website).await.unwrap();
        assert_eq!(website.state, BreakerState::Closed);

        let all = load_for_committee(&pool, "SCOM").await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
