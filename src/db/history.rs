//! Append-only sync history
//!
//! One entry per store write attempt, successful or not. History is the
//! audit trail; it is never updated or deleted.

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::models::{ChangeType, SourceType, SyncHistoryEntry};

/// Append a history entry. Returns the assigned row id.
pub async fn append(pool: &SqlitePool, entry: &SyncHistoryEntry) -> Result<i64> {
    let changed_fields = serde_json::to_string(&entry.changed_fields)
        .map_err(|e| SyncError::Internal(format!("serialize changed fields: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO sync_history (
            hearing_id, source, change_type, changed_fields,
            timestamp, success, error
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.hearing_id.to_string())
    .bind(entry.source.as_str())
    .bind(entry.change_type.as_str())
    .bind(&changed_fields)
    .bind(entry.timestamp.to_rfc3339())
    .bind(entry.success)
    .bind(&entry.error)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// All history entries for one hearing, oldest first.
pub async fn list_for_hearing(pool: &SqlitePool, hearing_id: Uuid) -> Result<Vec<SyncHistoryEntry>> {
    let rows = sqlx::query("SELECT * FROM sync_history WHERE hearing_id = ? ORDER BY id ASC")
        .bind(hearing_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(entry_from_row).collect()
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_history")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn entry_from_row(row: &SqliteRow) -> Result<SyncHistoryEntry> {
    let hearing_id_str: String = row.get("hearing_id");
    let hearing_id = Uuid::parse_str(&hearing_id_str)
        .map_err(|e| SyncError::Internal(format!("parse hearing id: {}", e)))?;

    let source_str: String = row.get("source");
    let source = SourceType::parse(&source_str)
        .ok_or_else(|| SyncError::Internal(format!("unknown source: {}", source_str)))?;

    let change_str: String = row.get("change_type");
    let change_type = ChangeType::parse(&change_str)
        .ok_or_else(|| SyncError::Internal(format!("unknown change type: {}", change_str)))?;

    let changed_fields: String = row.get("changed_fields");
    let timestamp_str: String = row.get("timestamp");
    let timestamp = chrono::DateTime::parse_from_rfc3339(&timestamp_str)
        .map_err(|e| SyncError::Internal(format!("parse timestamp: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(SyncHistoryEntry {
        id: row.get("id"),
        hearing_id,
        source,
        change_type,
        changed_fields: serde_json::from_str(&changed_fields)
            .map_err(|e| SyncError::Internal(format!("parse changed fields: {}", e)))?,
        timestamp,
        success: row.get("success"),
        error: row.get("error"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn append_and_list_round_trip() {
        let pool = crate::db::test_pool().await;
        let hearing_id = Uuid::new_v4();

        let entry = SyncHistoryEntry {
            id: 0,
            hearing_id,
            source: SourceType::Api,
            change_type: ChangeType::Create,
            changed_fields: vec!["title".into(), "date".into()],
            timestamp: Utc::now(),
            success: true,
            error: None,
        };
        let id = append(&pool, &entry).await.unwrap();
        assert!(id > 0);

        let failed = SyncHistoryEntry {
            change_type: ChangeType::Merge,
            success: false,
            error: Some("database is locked".into()),
            ..entry.clone()
        };
        append(&pool, &failed).await.unwrap();

        let entries = list_for_hearing(&pool, hearing_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].change_type, ChangeType::Create);
        assert!(entries[0].success);
        assert_eq!(entries[1].change_type, ChangeType::Merge);
        assert_eq!(entries[1].error.as_deref(), Some("database is locked"));
        assert_eq!(entries[0].changed_fields, vec!["title", "date"]);
    }
}
