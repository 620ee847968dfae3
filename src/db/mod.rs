//! Unified hearing store: SQLite access layer
//!
//! Four logical tables: `unified_hearings`, `sync_history`, `sync_config`,
//! `circuit_breakers`. Tables are created idempotently at startup; all
//! access goes through the per-table modules below.

pub mod breakers;
pub mod hearings;
pub mod history;
pub mod retry;
pub mod sync_config;

use sqlx::SqlitePool;
use std::path::Path;

use crate::error::Result;

/// Initialize the database connection pool, creating the file and schema
/// if missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!(url = %db_url, "Connecting to database");

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the store's tables if they don't exist.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS unified_hearings (
            id TEXT PRIMARY KEY,
            congress_api_id TEXT,
            committee_source_id TEXT,
            committee_code TEXT NOT NULL,
            title TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT,
            location TEXT,
            witnesses TEXT NOT NULL DEFAULT '[]',
            documents TEXT NOT NULL DEFAULT '[]',
            stream_urls TEXT NOT NULL DEFAULT '[]',
            source_api INTEGER NOT NULL DEFAULT 0,
            source_website INTEGER NOT NULL DEFAULT 0,
            sync_confidence REAL NOT NULL DEFAULT 0.0,
            api_checksum TEXT,
            website_checksum TEXT,
            last_synced_at TEXT NOT NULL,
            review_status TEXT NOT NULL DEFAULT 'matched'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_hearings_committee_date
         ON unified_hearings (committee_code, date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hearing_id TEXT NOT NULL,
            source TEXT NOT NULL,
            change_type TEXT NOT NULL,
            changed_fields TEXT NOT NULL DEFAULT '[]',
            timestamp TEXT NOT NULL,
            success INTEGER NOT NULL,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_config (
            committee_code TEXT PRIMARY KEY,
            priority INTEGER NOT NULL DEFAULT 1,
            sync_frequency_secs INTEGER NOT NULL DEFAULT 3600,
            api_enabled INTEGER NOT NULL DEFAULT 1,
            website_enabled INTEGER NOT NULL DEFAULT 1,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS circuit_breakers (
            committee_code TEXT NOT NULL,
            source TEXT NOT NULL,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            state TEXT NOT NULL DEFAULT 'closed',
            open_until TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (committee_code, source)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (unified_hearings, sync_history, sync_config, circuit_breakers)"
    );

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    init_tables(&pool).await.expect("schema init");
    pool
}
