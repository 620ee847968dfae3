//! Sync cycle orchestration
//!
//! One cycle reconciles one committee: fetch from each enabled source
//! (API first, then website), validate, classify through the
//! deduplication engine, and commit. Failures are contained per source;
//! one dead source never aborts the other's half of the cycle. Only a
//! completely unreachable store halts a cycle early.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::SyncSettings;
use crate::db;
use crate::error::{Result, SyncError};
use crate::events::{EventBus, HearingEvent};
use crate::models::{
    ChangeType, CommitteeSyncConfig, HearingRecord, SourceType, SyncHistoryEntry, UnifiedHearing,
};
use crate::sources::{self, ApiRateLimiter, SiteRateLimiter, SourceConnector};
use crate::sync::breaker::BreakerPolicy;
use crate::sync::dedup::{DedupDecision, DedupEngine};

/// Counters for one committee cycle
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CycleMetrics {
    pub discovered: usize,
    pub created: usize,
    pub merged: usize,
    pub updated: usize,
    pub flagged: usize,
    pub skipped: usize,
    pub errors: usize,
    pub duration_ms: u64,
}

/// Drives sync cycles for committees against a fixed connector set.
pub struct SyncOrchestrator {
    pool: SqlitePool,
    event_bus: EventBus,
    engine: DedupEngine,
    breaker_policy: BreakerPolicy,
    connectors: Vec<Arc<dyn SourceConnector>>,
    api_limiter: Arc<ApiRateLimiter>,
    site_limiter: Arc<SiteRateLimiter>,
    cycle_deadline: Duration,
    lookback_days: i64,
    store_retry_max_wait_ms: u64,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(
        pool: SqlitePool,
        event_bus: EventBus,
        settings: &SyncSettings,
        connectors: Vec<Arc<dyn SourceConnector>>,
        api_limiter: Arc<ApiRateLimiter>,
        site_limiter: Arc<SiteRateLimiter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            event_bus,
            engine: DedupEngine::new(settings),
            breaker_policy: BreakerPolicy::new(
                settings.breaker_failure_threshold,
                settings.breaker_recovery_secs,
            ),
            connectors,
            api_limiter,
            site_limiter,
            cycle_deadline: Duration::from_secs(settings.cycle_deadline_secs),
            lookback_days: settings.candidate_window_days.max(1) * 2,
            store_retry_max_wait_ms: settings.store_retry_max_wait_ms,
            cancel,
        }
    }

    /// Run one full reconciliation cycle for a committee.
    ///
    /// The API source runs before the website source so structured data
    /// establishes the canonical entity that scraped data then enriches.
    pub async fn run_cycle(&self, config: &CommitteeSyncConfig) -> Result<CycleMetrics> {
        let started = Instant::now();
        let committee = config.committee_code.as_str();
        let mut metrics = CycleMetrics::default();

        tracing::info!(committee, "Starting sync cycle");

        // Working snapshot, mutated in memory as the cycle commits so
        // records later in the cycle match entities created earlier in it
        let mut candidates = db::hearings::load_candidates(&self.pool, committee).await?;

        let mut ordered: Vec<Arc<dyn SourceConnector>> = self.connectors.clone();
        ordered.sort_by_key(|c| match c.source_type() {
            SourceType::Api => 0,
            SourceType::Website => 1,
        });

        for connector in ordered {
            let source = connector.source_type();
            if !config.source_enabled(source) {
                continue;
            }
            if self.cancel.is_cancelled() {
                tracing::info!(committee, "Cycle cancelled, stopping before fetch");
                break;
            }

            match self
                .sync_source(config, connector.as_ref(), started, &mut candidates, &mut metrics)
                .await
            {
                Ok(()) => {}
                Err(err @ SyncError::CycleAborted(_)) => {
                    // Store is gone; nothing further can commit
                    tracing::error!(committee, error = %err, "Sync cycle aborted");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(committee, source = %source, error = %err, "Source sync failed");
                    metrics.errors += 1;
                }
            }
        }

        metrics.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            committee,
            discovered = metrics.discovered,
            created = metrics.created,
            merged = metrics.merged,
            updated = metrics.updated,
            flagged = metrics.flagged,
            skipped = metrics.skipped,
            errors = metrics.errors,
            duration_ms = metrics.duration_ms,
            "Sync cycle complete"
        );

        self.event_bus.emit_lossy(HearingEvent::SyncCycleCompleted {
            committee_code: committee.to_string(),
            discovered: metrics.discovered,
            created: metrics.created,
            merged: metrics.merged,
            updated: metrics.updated,
            flagged: metrics.flagged,
            skipped: metrics.skipped,
            errors: metrics.errors,
            duration_ms: metrics.duration_ms,
            timestamp: Utc::now(),
        });

        Ok(metrics)
    }

    /// Fetch and apply one source's records. Availability failures feed
    /// the source's circuit breaker; data failures don't.
    async fn sync_source(
        &self,
        config: &CommitteeSyncConfig,
        connector: &dyn SourceConnector,
        cycle_started: Instant,
        candidates: &mut Vec<UnifiedHearing>,
        metrics: &mut CycleMetrics,
    ) -> Result<()> {
        let committee = config.committee_code.as_str();
        let source = connector.source_type();

        let mut breaker = db::breakers::load_breaker(&self.pool, committee, source).await?;
        let state_before = breaker.state;

        if !self.breaker_policy.allow_request(&mut breaker, Utc::now()) {
            tracing::debug!(committee, source = %source, "Circuit breaker open, skipping source");
            metrics.skipped += 1;
            return Ok(());
        }
        if breaker.state != state_before {
            self.persist_breaker(&breaker).await?;
        }

        match source {
            SourceType::Api => self.api_limiter.acquire().await,
            SourceType::Website => self.site_limiter.wait(committee).await,
        }

        let records = match self.fetch_with_deadline(connector, committee, cycle_started).await {
            Ok(records) => {
                let changed = breaker.state != state_before || breaker.consecutive_failures != 0;
                self.breaker_policy.record_success(&mut breaker);
                if changed {
                    self.persist_breaker(&breaker).await?;
                }
                records
            }
            Err(err) => {
                if err.counts_toward_breaker() {
                    let before = breaker.state;
                    self.breaker_policy.record_failure(&mut breaker, Utc::now());
                    self.persist_breaker(&breaker).await?;
                    if breaker.state != before {
                        self.event_bus.emit_lossy(HearingEvent::CircuitBreakerChanged {
                            committee_code: committee.to_string(),
                            source,
                            state: breaker.state,
                            consecutive_failures: breaker.consecutive_failures,
                            timestamp: Utc::now(),
                        });
                    }
                }
                return Err(err);
            }
        };

        tracing::debug!(committee, source = %source, count = records.len(), "Fetched records");

        for record in records {
            if self.cancel.is_cancelled() {
                tracing::info!(committee, "Cycle cancelled mid-batch");
                break;
            }
            metrics.discovered += 1;

            match self.process_record(&record, candidates, metrics).await {
                Ok(()) => {}
                Err(err @ SyncError::CycleAborted(_)) => return Err(err),
                Err(SyncError::SourceDataInvalid(msg)) => {
                    tracing::warn!(committee, source = %source, %msg, "Rejected invalid record");
                    metrics.errors += 1;
                }
                Err(err) => {
                    tracing::error!(
                        committee,
                        source = %source,
                        source_id = %record.source_id,
                        error = %err,
                        "Failed to apply record"
                    );
                    metrics.errors += 1;
                }
            }
        }

        Ok(())
    }

    /// Fetch within the remaining cycle deadline. An expired deadline or a
    /// fetch that outlives it is an availability failure.
    async fn fetch_with_deadline(
        &self,
        connector: &dyn SourceConnector,
        committee: &str,
        cycle_started: Instant,
    ) -> Result<Vec<HearingRecord>> {
        let source = connector.source_type();
        let remaining = self
            .cycle_deadline
            .checked_sub(cycle_started.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or_else(|| SyncError::SourceUnavailable {
                source_type: source,
                message: "cycle deadline expired before fetch".to_string(),
            })?;

        let since = Utc::now() - ChronoDuration::days(self.lookback_days);
        match tokio::time::timeout(remaining, connector.fetch(committee, since)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::SourceUnavailable {
                source_type: source,
                message: format!("fetch exceeded cycle deadline ({:?})", remaining),
            }),
        }
    }

    /// Validate, classify, and commit one record, updating the working
    /// candidate snapshot with the result.
    async fn process_record(
        &self,
        record: &HearingRecord,
        candidates: &mut Vec<UnifiedHearing>,
        metrics: &mut CycleMetrics,
    ) -> Result<()> {
        let date = sources::validate_record(record)?;
        let source = record.source_type;

        // Unchanged fast path: same source id, same content checksum
        let unchanged = candidates.iter().any(|c| {
            c.source_id_for(source) == Some(record.source_id.as_str())
                && c.checksum_for(source) == Some(record.content_checksum.as_str())
        });
        if unchanged {
            tracing::trace!(
                committee = %record.committee_code,
                source_id = %record.source_id,
                "Checksum unchanged, skipping record"
            );
            metrics.skipped += 1;
            return Ok(());
        }

        let decision = self.engine.classify(record, date, candidates);
        let hearing = decision.hearing().clone();
        let change_type = decision.change_type();
        let changed_fields = decision.changed_fields();

        self.commit(&hearing, source, change_type, changed_fields).await?;

        match candidates.iter_mut().find(|c| c.id == hearing.id) {
            Some(existing) => *existing = hearing,
            None => candidates.push(hearing),
        }

        match decision {
            DedupDecision::Merge { change_type: ChangeType::Update, .. } => metrics.updated += 1,
            DedupDecision::Merge { .. } => metrics.merged += 1,
            DedupDecision::Flag { .. } => metrics.flagged += 1,
            DedupDecision::Create { .. } => metrics.created += 1,
        }

        Ok(())
    }

    async fn persist_breaker(&self, state: &crate::models::CircuitBreakerState) -> Result<()> {
        db::retry::retry_on_lock("save_breaker", self.store_retry_max_wait_ms, || {
            db::breakers::save_breaker(&self.pool, state)
        })
        .await
    }

    /// Write the hearing and its audit entry, then notify subscribers.
    /// Lock contention retries with backoff; a dead store aborts the cycle.
    async fn commit(
        &self,
        hearing: &UnifiedHearing,
        source: SourceType,
        change_type: ChangeType,
        changed_fields: Vec<String>,
    ) -> Result<()> {
        let write = db::retry::retry_on_lock("upsert_hearing", self.store_retry_max_wait_ms, || {
            db::hearings::upsert_hearing(&self.pool, hearing)
        })
        .await;

        let entry = SyncHistoryEntry {
            id: 0,
            hearing_id: hearing.id,
            source,
            change_type,
            changed_fields,
            timestamp: Utc::now(),
            success: write.is_ok(),
            error: write.as_ref().err().map(|e| e.to_string()),
        };

        if let Err(history_err) = db::history::append(&self.pool, &entry).await {
            // History is best-effort when the write itself already failed
            tracing::error!(error = %history_err, "Failed to append sync history");
            if write.is_ok() {
                return Err(history_err);
            }
        }

        match write {
            Ok(()) => {
                self.event_bus.emit_lossy(HearingEvent::HearingCommitted {
                    hearing_id: hearing.id,
                    committee_code: hearing.committee_code.clone(),
                    change_type,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(SyncError::Database(db_err)) => {
                // Not a lock (retry handled those): store is unreachable
                Err(SyncError::CycleAborted(format!("store unreachable: {}", db_err)))
            }
            Err(err) => Err(err),
        }
    }
}
