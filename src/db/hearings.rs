//! Canonical hearing persistence
//!
//! Upserts are single-statement and therefore atomic: a failure mid-write
//! never leaves a partially merged row visible to readers. Collection
//! fields are stored as JSON arrays.

use chrono::NaiveDate;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::{ReviewStatus, UnifiedHearing};

/// Filters for committee-scoped queries
#[derive(Debug, Clone, Default)]
pub struct HearingFilter {
    pub review_status: Option<ReviewStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Insert or fully update a canonical hearing by id.
pub async fn upsert_hearing(pool: &SqlitePool, hearing: &UnifiedHearing) -> Result<()> {
    let witnesses = serde_json::to_string(&hearing.witnesses)
        .map_err(|e| SyncError::Internal(format!("serialize witnesses: {}", e)))?;
    let documents = serde_json::to_string(&hearing.documents)
        .map_err(|e| SyncError::Internal(format!("serialize documents: {}", e)))?;
    let stream_urls = serde_json::to_string(&hearing.stream_urls)
        .map_err(|e| SyncError::Internal(format!("serialize stream urls: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO unified_hearings (
            id, congress_api_id, committee_source_id, committee_code,
            title, date, time, location,
            witnesses, documents, stream_urls,
            source_api, source_website, sync_confidence,
            api_checksum, website_checksum, last_synced_at, review_status
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            congress_api_id = excluded.congress_api_id,
            committee_source_id = excluded.committee_source_id,
            committee_code = excluded.committee_code,
            title = excluded.title,
            date = excluded.date,
            time = excluded.time,
            location = excluded.location,
            witnesses = excluded.witnesses,
            documents = excluded.documents,
            stream_urls = excluded.stream_urls,
            source_api = excluded.source_api,
            source_website = excluded.source_website,
            sync_confidence = excluded.sync_confidence,
            api_checksum = excluded.api_checksum,
            website_checksum = excluded.website_checksum,
            last_synced_at = excluded.last_synced_at,
            review_status = excluded.review_status
        "#,
    )
    .bind(hearing.id.to_string())
    .bind(&hearing.congress_api_id)
    .bind(&hearing.committee_source_id)
    .bind(&hearing.committee_code)
    .bind(&hearing.title)
    .bind(hearing.date.to_string())
    .bind(&hearing.time)
    .bind(&hearing.location)
    .bind(&witnesses)
    .bind(&documents)
    .bind(&stream_urls)
    .bind(hearing.source_api)
    .bind(hearing.source_website)
    .bind(hearing.sync_confidence)
    .bind(&hearing.api_checksum)
    .bind(&hearing.website_checksum)
    .bind(hearing.last_synced_at.to_rfc3339())
    .bind(hearing.review_status.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one hearing by id.
pub async fn get_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<UnifiedHearing>> {
    let row = sqlx::query("SELECT * FROM unified_hearings WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| hearing_from_row(&r)).transpose()
}

/// List hearings for a committee with optional filters, newest first.
pub async fn list_by_committee(
    pool: &SqlitePool,
    committee_code: &str,
    filter: &HearingFilter,
) -> Result<Vec<UnifiedHearing>> {
    let mut sql = String::from("SELECT * FROM unified_hearings WHERE committee_code = ?");
    if filter.review_status.is_some() {
        sql.push_str(" AND review_status = ?");
    }
    if filter.from.is_some() {
        sql.push_str(" AND date >= ?");
    }
    if filter.to.is_some() {
        sql.push_str(" AND date <= ?");
    }
    sql.push_str(" ORDER BY date DESC, title ASC");

    let mut query = sqlx::query(&sql).bind(committee_code);
    if let Some(status) = filter.review_status {
        query = query.bind(status.as_str());
    }
    if let Some(from) = filter.from {
        query = query.bind(from.to_string());
    }
    if let Some(to) = filter.to {
        query = query.bind(to.to_string());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(hearing_from_row).collect()
}

/// Load all non-stale hearings for a committee: the candidate snapshot a
/// sync cycle scores incoming records against.
pub async fn load_candidates(pool: &SqlitePool, committee_code: &str) -> Result<Vec<UnifiedHearing>> {
    let rows = sqlx::query(
        "SELECT * FROM unified_hearings
         WHERE committee_code = ? AND review_status != 'stale'
         ORDER BY date ASC, id ASC",
    )
    .bind(committee_code)
    .fetch_all(pool)
    .await?;

    rows.iter().map(hearing_from_row).collect()
}

/// Mark a superseded hearing stale. Rows are never hard-deleted.
pub async fn mark_stale(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE unified_hearings SET review_status = 'stale' WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Count all rows, stale included.
pub async fn count_hearings(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM unified_hearings")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn hearing_from_row(row: &SqliteRow) -> Result<UnifiedHearing> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| SyncError::Internal(format!("parse hearing id: {}", e)))?;

    let date_str: String = row.get("date");
    let date = date_str
        .parse::<NaiveDate>()
        .map_err(|e| SyncError::Internal(format!("parse hearing date: {}", e)))?;

    let synced_str: String = row.get("last_synced_at");
    let last_synced_at = chrono::DateTime::parse_from_rfc3339(&synced_str)
        .map_err(|e| SyncError::Internal(format!("parse last_synced_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let status_str: String = row.get("review_status");
    let review_status = ReviewStatus::parse(&status_str)
        .ok_or_else(|| SyncError::Internal(format!("unknown review status: {}", status_str)))?;

    let witnesses: String = row.get("witnesses");
    let documents: String = row.get("documents");
    let stream_urls: String = row.get("stream_urls");

    Ok(UnifiedHearing {
        id,
        congress_api_id: row.get("congress_api_id"),
        committee_source_id: row.get("committee_source_id"),
        committee_code: row.get("committee_code"),
        title: row.get("title"),
        date,
        time: row.get("time"),
        location: row.get("location"),
        witnesses: serde_json::from_str(&witnesses)
            .map_err(|e| SyncError::Internal(format!("parse witnesses: {}", e)))?,
        documents: serde_json::from_str(&documents)
            .map_err(|e| SyncError::Internal(format!("parse documents: {}", e)))?,
        stream_urls: serde_json::from_str(&stream_urls)
            .map_err(|e| SyncError::Internal(format!("parse stream urls: {}", e)))?,
        source_api: row.get("source_api"),
        source_website: row.get("source_website"),
        sync_confidence: row.get("sync_confidence"),
        api_checksum: row.get("api_checksum"),
        website_checksum: row.get("website_checksum"),
        last_synced_at,
        review_status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HearingRecord, SourceType};
    use chrono::Utc;

    fn sample_record(title: &str, date: (i32, u32, u32)) -> HearingRecord {
        HearingRecord {
            source_type: SourceType::Api,
            source_id: "evt-1".into(),
            committee_code: "SSJU".into(),
            title: title.into(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
            time: Some("10:00".into()),
            location: Some("Dirksen 226".into()),
            witnesses: vec!["Jane Smith".into()],
            documents: vec![],
            stream_urls: vec![],
            content_checksum: "c1".into(),
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_round_trip() {
        let pool = crate::db::test_pool().await;
        let hearing = UnifiedHearing::from_record(
            &sample_record("Executive Business Meeting", (2025, 6, 26)),
            1.0,
            ReviewStatus::Matched,
        );

        upsert_hearing(&pool, &hearing).await.unwrap();
        let loaded = get_by_id(&pool, hearing.id).await.unwrap().unwrap();

        assert_eq!(loaded.title, hearing.title);
        assert_eq!(loaded.date, hearing.date);
        assert_eq!(loaded.witnesses, hearing.witnesses);
        assert_eq!(loaded.review_status, ReviewStatus::Matched);
        assert!(loaded.source_api);
        assert!(!loaded.source_website);
    }

    #[tokio::test]
    async fn upsert_twice_updates_in_place() {
        let pool = crate::db::test_pool().await;
        let mut hearing = UnifiedHearing::from_record(
            &sample_record("Oversight of the FBI", (2025, 7, 9)),
            1.0,
            ReviewStatus::Matched,
        );
        upsert_hearing(&pool, &hearing).await.unwrap();

        hearing.location = Some("Hart 216".into());
        hearing.source_website = true;
        upsert_hearing(&pool, &hearing).await.unwrap();

        assert_eq!(count_hearings(&pool).await.unwrap(), 1);
        let loaded = get_by_id(&pool, hearing.id).await.unwrap().unwrap();
        assert_eq!(loaded.location.as_deref(), Some("Hart 216"));
        assert!(loaded.source_website);
    }

    #[tokio::test]
    async fn list_by_committee_applies_filters() {
        let pool = crate::db::test_pool().await;
        let a = UnifiedHearing::from_record(
            &sample_record("Markup Session", (2025, 6, 1)),
            1.0,
            ReviewStatus::Matched,
        );
        let mut b = UnifiedHearing::from_record(
            &sample_record("Budget Hearing", (2025, 9, 1)),
            0.7,
            ReviewStatus::NeedsReview,
        );
        b.committee_code = "SSJU".into();
        upsert_hearing(&pool, &a).await.unwrap();
        upsert_hearing(&pool, &b).await.unwrap();

        let all = list_by_committee(&pool, "SSJU", &HearingFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let flagged = list_by_committee(
            &pool,
            "SSJU",
            &HearingFilter {
                review_status: Some(ReviewStatus::NeedsReview),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].title, "Budget Hearing");

        let summer = list_by_committee(
            &pool,
            "SSJU",
            &HearingFilter {
                from: NaiveDate::from_ymd_opt(2025, 8, 1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(summer.len(), 1);
        assert_eq!(summer[0].title, "Budget Hearing");
    }

    #[tokio::test]
    async fn stale_rows_are_kept_but_excluded_from_candidates() {
        let pool = crate::db::test_pool().await;
        let hearing = UnifiedHearing::from_record(
            &sample_record("Nomination Hearing", (2025, 5, 15)),
            1.0,
            ReviewStatus::Matched,
        );
        upsert_hearing(&pool, &hearing).await.unwrap();
        mark_stale(&pool, hearing.id).await.unwrap();

        assert_eq!(count_hearings(&pool).await.unwrap(), 1);
        assert!(load_candidates(&pool, "SSJU").await.unwrap().is_empty());
        let loaded = get_by_id(&pool, hearing.id).await.unwrap().unwrap();
        assert_eq!(loaded.review_status, ReviewStatus::Stale);
    }
}
