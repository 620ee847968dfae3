//! Core data model for hearing synchronization
//!
//! `HearingRecord` is the ephemeral, source-tagged shape every connector
//! normalizes into before anything reaches the sync core. `UnifiedHearing`
//! is the canonical, persisted entity the deduplication engine maintains.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Which upstream produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Official structured API
    Api,
    /// Committee-website scrape
    Website,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Api => "api",
            SourceType::Website => "website",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "api" => Some(SourceType::Api),
            "website" => Some(SourceType::Website),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review state of a canonical hearing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Confidently matched (or single-source, unambiguous)
    Matched,
    /// Similarity fell in the review band; awaiting human adjudication
    NeedsReview,
    /// Superseded entry kept for audit continuity, never hard-deleted
    Stale,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Matched => "matched",
            ReviewStatus::NeedsReview => "needs_review",
            ReviewStatus::Stale => "stale",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matched" => Some(ReviewStatus::Matched),
            "needs_review" => Some(ReviewStatus::NeedsReview),
            "stale" => Some(ReviewStatus::Stale),
            _ => None,
        }
    }
}

/// Kind of write recorded in the sync history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Merge,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Update => "update",
            ChangeType::Merge => "merge",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(ChangeType::Create),
            "update" => Some(ChangeType::Update),
            "merge" => Some(ChangeType::Merge),
            _ => None,
        }
    }
}

/// Normalized hearing record emitted by a source connector.
///
/// Immutable once emitted. `date` is optional because source data can be
/// incomplete; the orchestrator rejects dateless records at its boundary
/// before they reach the deduplication engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HearingRecord {
    pub source_type: SourceType,
    /// Source-local identifier (event id for the API, page slug for scrapes)
    pub source_id: String,
    pub committee_code: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    /// Scheduled start time, "HH:MM" where the source supplies one
    pub time: Option<String>,
    pub location: Option<String>,
    pub witnesses: Vec<String>,
    pub documents: Vec<String>,
    pub stream_urls: Vec<String>,
    /// Checksum of the source payload, for the unchanged-record fast path
    pub content_checksum: String,
    pub fetched_at: DateTime<Utc>,
}

/// Canonical deduplicated hearing entity.
///
/// Invariants: at least one of `source_api`/`source_website` is true,
/// `sync_confidence` stays in [0,1], and superseded rows are marked
/// `Stale` rather than deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedHearing {
    pub id: Uuid,
    /// Source id on the API side, once that source has contributed
    pub congress_api_id: Option<String>,
    /// Source id on the website side, once that source has contributed
    pub committee_source_id: Option<String>,
    pub committee_code: String,
    pub title: String,
    pub date: NaiveDate,
    pub time: Option<String>,
    pub location: Option<String>,
    pub witnesses: Vec<String>,
    pub documents: Vec<String>,
    pub stream_urls: Vec<String>,
    pub source_api: bool,
    pub source_website: bool,
    /// Similarity score retained from the most recent merge decision
    pub sync_confidence: f64,
    /// Last seen content checksum per source, for skip-unchanged
    pub api_checksum: Option<String>,
    pub website_checksum: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub review_status: ReviewStatus,
}

impl UnifiedHearing {
    /// Build a fresh canonical entity from a single validated record.
    ///
    /// The caller guarantees `record.date` is present (boundary validation).
    pub fn from_record(record: &HearingRecord, confidence: f64, status: ReviewStatus) -> Self {
        let (congress_api_id, committee_source_id, api_checksum, website_checksum) =
            match record.source_type {
                SourceType::Api => (
                    Some(record.source_id.clone()),
                    None,
                    Some(record.content_checksum.clone()),
                    None,
                ),
                SourceType::Website => (
                    None,
                    Some(record.source_id.clone()),
                    None,
                    Some(record.content_checksum.clone()),
                ),
            };

        Self {
            id: Uuid::new_v4(),
            congress_api_id,
            committee_source_id,
            committee_code: record.committee_code.clone(),
            title: record.title.clone(),
            date: record.date.unwrap_or_default(),
            time: record.time.clone(),
            location: record.location.clone(),
            witnesses: record.witnesses.clone(),
            documents: record.documents.clone(),
            stream_urls: record.stream_urls.clone(),
            source_api: record.source_type == SourceType::Api,
            source_website: record.source_type == SourceType::Website,
            sync_confidence: confidence.clamp(0.0, 1.0),
            api_checksum,
            website_checksum,
            last_synced_at: record.fetched_at,
            review_status: status,
        }
    }

    /// Checksum last recorded for the given source, if that source has
    /// contributed to this entity.
    pub fn checksum_for(&self, source: SourceType) -> Option<&str> {
        match source {
            SourceType::Api => self.api_checksum.as_deref(),
            SourceType::Website => self.website_checksum.as_deref(),
        }
    }

    /// Source id last recorded for the given source.
    pub fn source_id_for(&self, source: SourceType) -> Option<&str> {
        match source {
            SourceType::Api => self.congress_api_id.as_deref(),
            SourceType::Website => self.committee_source_id.as_deref(),
        }
    }
}

/// One append-only audit entry per store write attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    /// Assigned by the database on insert; 0 before persistence
    #[serde(default)]
    pub id: i64,
    pub hearing_id: Uuid,
    pub source: SourceType,
    pub change_type: ChangeType,
    pub changed_fields: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

/// Per-committee synchronization configuration, owned by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitteeSyncConfig {
    pub committee_code: String,
    /// Priority >= 1; higher priority divides the sync interval
    pub priority: u32,
    pub sync_frequency_secs: u64,
    pub api_enabled: bool,
    pub website_enabled: bool,
    pub active: bool,
}

impl CommitteeSyncConfig {
    pub fn new(committee_code: impl Into<String>) -> Self {
        Self {
            committee_code: committee_code.into(),
            priority: 1,
            sync_frequency_secs: 3600,
            api_enabled: true,
            website_enabled: true,
            active: true,
        }
    }

    /// Effective cadence: higher-priority committees sync more frequently.
    pub fn effective_interval(&self) -> Duration {
        let divisor = self.priority.max(1) as u64;
        Duration::from_secs((self.sync_frequency_secs / divisor).max(1))
    }

    pub fn source_enabled(&self, source: SourceType) -> bool {
        match source {
            SourceType::Api => self.api_enabled,
            SourceType::Website => self.website_enabled,
        }
    }
}

/// Circuit breaker position for one (committee, source) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "closed" => Some(BreakerState::Closed),
            "open" => Some(BreakerState::Open),
            "half_open" => Some(BreakerState::HalfOpen),
            _ => None,
        }
    }
}

/// Persisted circuit breaker state, mutated only by the orchestrator
/// owning the (committee, source) pair. Transition logic lives in
/// [`crate::sync::breaker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub committee_code: String,
    pub source: SourceType,
    pub consecutive_failures: u32,
    pub state: BreakerState,
    pub open_until: Option<DateTime<Utc>>,
}

impl CircuitBreakerState {
    pub fn new(committee_code: impl Into<String>, source: SourceType) -> Self {
        Self {
            committee_code: committee_code.into(),
            source,
            consecutive_failures: 0,
            state: BreakerState::Closed,
            open_until: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_round_trip() {
        for s in [SourceType::Api, SourceType::Website] {
            assert_eq!(SourceType::parse(s.as_str()), Some(s));
        }
        assert_eq!(SourceType::parse("rss"), None);
    }

    #[test]
    fn review_status_round_trip() {
        for s in [
            ReviewStatus::Matched,
            ReviewStatus::NeedsReview,
            ReviewStatus::Stale,
        ] {
            assert_eq!(ReviewStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn effective_interval_scales_with_priority() {
        let mut cfg = CommitteeSyncConfig::new("SSJU");
        cfg.sync_frequency_secs = 3600;
        cfg.priority = 1;
        assert_eq!(cfg.effective_interval(), Duration::from_secs(3600));
        cfg.priority = 4;
        assert_eq!(cfg.effective_interval(), Duration::from_secs(900));
        // Priority 0 is treated as 1, never divides by zero
        cfg.priority = 0;
        assert_eq!(cfg.effective_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn from_record_sets_source_flags() {
        let rec = HearingRecord {
            source_type: SourceType::Website,
            source_id: "judiciary-2025-06-26".into(),
            committee_code: "SSJU".into(),
            title: "Executive Business Meeting".into(),
            date: Some(NaiveDate::from_ymd_opt(2025, 6, 26).unwrap()),
            time: None,
            location: None,
            witnesses: vec![],
            documents: vec![],
            stream_urls: vec!["https://example.gov/live".into()],
            content_checksum: "abc".into(),
            fetched_at: Utc::now(),
        };
        let hearing = UnifiedHearing::from_record(&rec, 1.0, ReviewStatus::Matched);
        assert!(!hearing.source_api);
        assert!(hearing.source_website);
        assert_eq!(hearing.committee_source_id.as_deref(), Some("judiciary-2025-06-26"));
        assert_eq!(hearing.congress_api_id, None);
        assert_eq!(hearing.checksum_for(SourceType::Website), Some("abc"));
        assert_eq!(hearing.checksum_for(SourceType::Api), None);
    }
}
