//! Per-committee sync configuration persistence

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::Result;
use crate::models::CommitteeSyncConfig;

/// Insert or update a committee's sync configuration.
pub async fn upsert_config(pool: &SqlitePool, config: &CommitteeSyncConfig) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sync_config (
            committee_code, priority, sync_frequency_secs,
            api_enabled, website_enabled, active
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(committee_code) DO UPDATE SET
            priority = excluded.priority,
            sync_frequency_secs = excluded.sync_frequency_secs,
            api_enabled = excluded.api_enabled,
            website_enabled = excluded.website_enabled,
            active = excluded.active
        "#,
    )
    .bind(&config.committee_code)
    .bind(config.priority as i64)
    .bind(config.sync_frequency_secs as i64)
    .bind(config.api_enabled)
    .bind(config.website_enabled)
    .bind(config.active)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one committee's configuration.
pub async fn get_config(pool: &SqlitePool, committee_code: &str) -> Result<Option<CommitteeSyncConfig>> {
    let row = sqlx::query("SELECT * FROM sync_config WHERE committee_code = ?")
        .bind(committee_code)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| config_from_row(&r)))
}

/// All active committee configurations, highest priority first.
pub async fn load_active(pool: &SqlitePool) -> Result<Vec<CommitteeSyncConfig>> {
    let rows = sqlx::query(
        "SELECT * FROM sync_config WHERE active = 1 ORDER BY priority DESC, committee_code ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(config_from_row).collect())
}

fn config_from_row(row: &SqliteRow) -> CommitteeSyncConfig {
    CommitteeSyncConfig {
        committee_code: row.get("committee_code"),
        priority: row.get::<i64, _>("priority").max(1) as u32,
        sync_frequency_secs: row.get::<i64, _>("sync_frequency_secs").max(1) as u64,
        api_enabled: row.get("api_enabled"),
        website_enabled: row.get("website_enabled"),
        active: row.get("active"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_and_load_active() {
        let pool = crate::db::test_pool().await;

        let mut ssju = CommitteeSyncConfig::new("SSJU");
        ssju.priority = 3;
        upsert_config(&pool, &ssju).await.unwrap();

        let mut scom = CommitteeSyncConfig::new("SCOM");
        scom.website_enabled = false;
        upsert_config(&pool, &scom).await.unwrap();

        let mut inactive = CommitteeSyncConfig::new("SBAN");
        inactive.active = false;
        upsert_config(&pool, &inactive).await.unwrap();

        let active = load_active(&pool).await.unwrap();
        assert_eq!(active.len(), 2);
        // Highest priority first
        assert_eq!(active[0].committee_code, "SSJU");
        assert!(!active[1].website_enabled);

        let loaded = get_config(&pool, "SSJU").await.unwrap().unwrap();
        assert_eq!(loaded.priority, 3);
        assert!(get_config(&pool, "SXYZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_updates_existing_row() {
        let pool = crate::db::test_pool().await;
        let mut cfg = CommitteeSyncConfig::new("SSJU");
        upsert_config(&pool, &cfg).await.unwrap();

        cfg.sync_frequency_secs = 600;
        upsert_config(&pool, &cfg).await.unwrap();

        let loaded = get_config(&pool, "SSJU").await.unwrap().unwrap();
        assert_eq!(loaded.sync_frequency_secs, 600);
        assert_eq!(load_active(&pool).await.unwrap().len(), 1);
    }
}
