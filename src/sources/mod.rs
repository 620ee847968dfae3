//! Source connector boundary
//!
//! Connectors (the official API client, per-committee website scrapers)
//! live outside this crate; they normalize source-specific payloads into
//! `HearingRecord`s and hand them over through the `SourceConnector`
//! trait. Everything on this side of the boundary — validation and rate
//! limiting — is the sync core's responsibility.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::{Result, SyncError};
use crate::models::{HearingRecord, SourceType};

/// A normalized view onto one upstream source.
///
/// `fetch` returns every hearing record the source knows about for the
/// committee since the given instant, or `SourceUnavailable` when the
/// source cannot be reached. Connectors never partially fail: a fetch
/// either yields a full batch or an error.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn source_type(&self) -> SourceType;

    async fn fetch(
        &self,
        committee_code: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<HearingRecord>>;
}

/// Validate a record at the orchestrator boundary.
///
/// Records missing a committee code or date are data problems, not
/// availability problems: they are rejected as `SourceDataInvalid` and
/// never reach the deduplication engine or the circuit breaker.
pub fn validate_record(record: &HearingRecord) -> Result<NaiveDate> {
    if record.committee_code.trim().is_empty() {
        return Err(SyncError::SourceDataInvalid(format!(
            "record {} from {} has no committee code",
            record.source_id, record.source_type
        )));
    }
    if record.title.trim().is_empty() {
        return Err(SyncError::SourceDataInvalid(format!(
            "record {} from {} has an empty title",
            record.source_id, record.source_type
        )));
    }
    match record.date {
        Some(date) => Ok(date),
        None => Err(SyncError::SourceDataInvalid(format!(
            "record {} from {} has no date",
            record.source_id, record.source_type
        ))),
    }
}

/// Global token-bucket limiter for API-source calls, shared across all
/// concurrent committee workers. Callers block until capacity is
/// available; requests are never dropped.
pub struct ApiRateLimiter {
    inner: DefaultDirectRateLimiter,
}

impl ApiRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: RateLimiter::direct(Quota::per_second(rate)),
        }
    }

    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

/// Per-site limiter for website-source calls: enforces a minimum delay
/// between consecutive requests to any one committee site. One site's
/// delay never blocks requests to another site: the slot is reserved
/// under the lock, the sleep happens after it is released.
pub struct SiteRateLimiter {
    next_slot: Mutex<HashMap<String, Instant>>,
    min_interval: Duration,
}

impl SiteRateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            next_slot: Mutex::new(HashMap::new()),
            min_interval,
        }
    }

    /// Wait until the site's minimum inter-request delay has elapsed.
    /// Concurrent callers for the same site queue behind each other's
    /// reserved slots.
    pub async fn wait(&self, site_key: &str) {
        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match slots.get(site_key) {
                Some(reserved) => (*reserved + self.min_interval).max(now),
                None => now,
            };
            slots.insert(site_key.to_string(), slot);
            slot
        };

        let now = Instant::now();
        if slot > now {
            let wait_time = slot - now;
            tracing::debug!(site = site_key, ?wait_time, "Rate limiting website fetch");
            tokio::time::sleep(wait_time).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(committee: &str, title: &str, date: Option<NaiveDate>) -> HearingRecord {
        HearingRecord {
            source_type: SourceType::Website,
            source_id: "slug-1".into(),
            committee_code: committee.into(),
            title: title.into(),
            date,
            time: None,
            location: None,
            witnesses: vec![],
            documents: vec![],
            stream_urls: vec![],
            content_checksum: "x".into(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn valid_record_passes() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 26);
        let rec = record("SSJU", "Executive Business Meeting", date);
        assert_eq!(validate_record(&rec).unwrap(), date.unwrap());
    }

    #[test]
    fn missing_committee_or_date_rejected() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 26);
        assert!(matches!(
            validate_record(&record("", "Hearing", date)),
            Err(SyncError::SourceDataInvalid(_))
        ));
        assert!(matches!(
            validate_record(&record("SSJU", "Hearing", None)),
            Err(SyncError::SourceDataInvalid(_))
        ));
        assert!(matches!(
            validate_record(&record("SSJU", "   ", date)),
            Err(SyncError::SourceDataInvalid(_))
        ));
    }

    #[tokio::test]
    async fn site_limiter_enforces_min_interval() {
        let limiter = SiteRateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();

        limiter.wait("ssju").await;
        limiter.wait("ssju").await;

        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn site_limiter_tracks_sites_independently() {
        let limiter = SiteRateLimiter::new(Duration::from_millis(200));
        let start = Instant::now();

        limiter.wait("ssju").await;
        limiter.wait("scom").await;

        // Different sites don't wait on each other
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn site_limiter_waiter_does_not_block_other_sites() {
        let limiter = std::sync::Arc::new(SiteRateLimiter::new(Duration::from_millis(400)));
        limiter.wait("ssju").await;

        // A second ssju caller is now sleeping out its delay
        let queued = limiter.clone();
        let waiter = tokio::spawn(async move { queued.wait("ssju").await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A first request to a different site must go straight through
        let start = Instant::now();
        limiter.wait("scom").await;
        assert!(
            start.elapsed() < Duration::from_millis(100),
            "cross-site request was delayed {:?}",
            start.elapsed()
        );

        waiter.await.unwrap();
    }
}
