//! Service configuration
//!
//! Loaded as a typed structure from a TOML file with environment-variable
//! overrides; never parsed from free-form CLI flags. Thresholds and the
//! merge-priority rule are deployment defaults inferred from upstream
//! documentation, so every one of them is a config field rather than a
//! hard constant.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Weights for the similarity scorer. Must sum to 1.0 for scores to stay
/// in [0,1]; `validate` enforces this within a small tolerance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub title: f64,
    pub date: f64,
    pub metadata: f64,
    pub witnesses: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            title: 0.40,
            date: 0.30,
            metadata: 0.20,
            witnesses: 0.10,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.title + self.date + self.metadata + self.witnesses
    }
}

/// Top-level service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// SQLite database location
    pub database_path: PathBuf,
    /// Bind address for the status/query HTTP surface
    pub bind_addr: String,

    /// Score at or above which two records auto-merge
    pub auto_merge_threshold: f64,
    /// Score at or above which (but below auto-merge) a record is flagged
    /// for human review instead of merging
    pub review_threshold: f64,
    pub weights: ScoreWeights,

    /// Consecutive source failures before a breaker opens
    pub breaker_failure_threshold: u32,
    /// Seconds an open breaker waits before allowing a half-open trial
    pub breaker_recovery_secs: u64,

    /// Concurrent committee cycles allowed at once
    pub worker_pool_size: usize,
    /// Per-cycle deadline in seconds; expired fetches are abandoned
    pub cycle_deadline_secs: u64,
    /// Days on either side of a record's date considered for candidates
    pub candidate_window_days: i64,
    /// Scheduler tick cadence in seconds
    pub tick_interval_secs: u64,

    /// Global API-source rate limit, requests per second across all workers
    pub api_requests_per_second: u32,
    /// Minimum delay between requests to any one committee website
    pub website_min_interval_ms: u64,

    /// Total time budget for retrying a locked store write
    pub store_retry_max_wait_ms: u64,

    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_addr: "127.0.0.1:5860".to_string(),
            auto_merge_threshold: 0.85,
            review_threshold: 0.60,
            weights: ScoreWeights::default(),
            breaker_failure_threshold: 5,
            breaker_recovery_secs: 7200,
            worker_pool_size: 4,
            cycle_deadline_secs: 300,
            candidate_window_days: 14,
            tick_interval_secs: 30,
            api_requests_per_second: 2,
            website_min_interval_ms: 2000,
            store_retry_max_wait_ms: 5000,
            event_capacity: 256,
        }
    }
}

impl SyncSettings {
    /// Load settings with the resolution order: explicit path argument,
    /// `HEARING_SYNC_CONFIG` environment variable, platform config
    /// directory, compiled defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("HEARING_SYNC_CONFIG").ok().map(PathBuf::from))
            .or_else(default_config_path);

        let mut settings = match path {
            Some(ref p) if p.exists() => {
                let content = std::fs::read_to_string(p)?;
                let parsed: SyncSettings = toml::from_str(&content)
                    .map_err(|e| SyncError::Config(format!("parse {}: {}", p.display(), e)))?;
                tracing::info!(path = %p.display(), "Loaded configuration file");
                parsed
            }
            _ => {
                tracing::info!("No configuration file found, using defaults");
                SyncSettings::default()
            }
        };

        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    /// Environment overrides for the deployment-specific knobs.
    fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var("HEARING_SYNC_DB") {
            self.database_path = PathBuf::from(db);
        }
        if let Ok(addr) = std::env::var("HEARING_SYNC_BIND") {
            self.bind_addr = addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.auto_merge_threshold)
            || !(0.0..=1.0).contains(&self.review_threshold)
        {
            return Err(SyncError::Config(
                "thresholds must lie in [0,1]".to_string(),
            ));
        }
        if self.review_threshold >= self.auto_merge_threshold {
            return Err(SyncError::Config(format!(
                "review threshold {} must be below auto-merge threshold {}",
                self.review_threshold, self.auto_merge_threshold
            )));
        }
        if (self.weights.sum() - 1.0).abs() > 1e-6 {
            return Err(SyncError::Config(format!(
                "similarity weights must sum to 1.0 (got {})",
                self.weights.sum()
            )));
        }
        if self.worker_pool_size == 0 {
            return Err(SyncError::Config("worker pool size must be >= 1".into()));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(SyncError::Config(
                "breaker failure threshold must be >= 1".into(),
            ));
        }
        if self.api_requests_per_second == 0 {
            return Err(SyncError::Config(
                "API rate limit must be >= 1 request/second".into(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("hearing-sync").join("config.toml"))
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("hearing-sync").join("hearings.db"))
        .unwrap_or_else(|| PathBuf::from("./hearings.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = SyncSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.auto_merge_threshold, 0.85);
        assert_eq!(settings.review_threshold, 0.60);
        assert_eq!(settings.breaker_failure_threshold, 5);
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut settings = SyncSettings::default();
        settings.review_threshold = 0.9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut settings = SyncSettings::default();
        settings.weights.title = 0.9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: SyncSettings =
            toml::from_str("auto_merge_threshold = 0.9\n[weights]\ntitle = 0.4\n").unwrap();
        assert_eq!(parsed.auto_merge_threshold, 0.9);
        assert_eq!(parsed.review_threshold, 0.60);
        assert_eq!(parsed.weights.date, 0.30);
    }
}
