//! Deduplication engine
//!
//! Classifies an incoming record against the committee's existing
//! canonical hearings and produces a decision: merge into the best
//! candidate, flag for review, or create a distinct entity. Merges are
//! field-level, deterministic, and idempotent.
//!
//! Merge policy: on conflicting scalar fields the API source wins when
//! both sources have supplied a value; website-supplied fields are
//! additive. Collection fields union on a normalized identity key so
//! repeated runs never accumulate duplicates.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::config::{ScoreWeights, SyncSettings};
use crate::models::{ChangeType, HearingRecord, ReviewStatus, SourceType, UnifiedHearing};
use crate::sync::similarity::{self, normalize_text};

/// Outcome of classifying one record against the candidate set
#[derive(Debug, Clone)]
pub enum DedupDecision {
    /// Confident match: the candidate absorbed the record
    Merge {
        hearing: UnifiedHearing,
        changed_fields: Vec<String>,
        score: f64,
        /// Update when the record's source had already contributed to the
        /// candidate; Merge when a second source joins it
        change_type: ChangeType,
    },
    /// Ambiguous match: the record becomes its own entity, flagged for
    /// human review, never silently merged
    Flag {
        hearing: UnifiedHearing,
        score: f64,
        nearest: Uuid,
    },
    /// No sufficiently similar candidate: a distinct new entity
    Create { hearing: UnifiedHearing },
}

impl DedupDecision {
    pub fn hearing(&self) -> &UnifiedHearing {
        match self {
            DedupDecision::Merge { hearing, .. } => hearing,
            DedupDecision::Flag { hearing, .. } => hearing,
            DedupDecision::Create { hearing } => hearing,
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match self {
            DedupDecision::Merge { change_type, .. } => *change_type,
            DedupDecision::Flag { .. } | DedupDecision::Create { .. } => ChangeType::Create,
        }
    }

    pub fn changed_fields(&self) -> Vec<String> {
        match self {
            DedupDecision::Merge { changed_fields, .. } => changed_fields.clone(),
            DedupDecision::Flag { .. } | DedupDecision::Create { .. } => vec!["*".to_string()],
        }
    }
}

/// Deduplication engine with deployment-configurable thresholds
pub struct DedupEngine {
    auto_merge_threshold: f64,
    review_threshold: f64,
    candidate_window_days: i64,
    weights: ScoreWeights,
}

impl DedupEngine {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            auto_merge_threshold: settings.auto_merge_threshold,
            review_threshold: settings.review_threshold,
            candidate_window_days: settings.candidate_window_days,
            weights: settings.weights,
        }
    }

    /// Classify a validated record against same-committee candidates.
    ///
    /// `date` is the record's validated date; `candidates` is the cycle's
    /// working snapshot. Candidates outside the date window never score.
    pub fn classify(
        &self,
        record: &HearingRecord,
        date: NaiveDate,
        candidates: &[UnifiedHearing],
    ) -> DedupDecision {
        let mut best: Option<(f64, &UnifiedHearing)> = None;

        for candidate in candidates {
            let gap = (candidate.date - date).num_days().abs();
            if gap > self.candidate_window_days {
                continue;
            }

            let score = similarity::score(record, candidate, &self.weights);
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, candidate));
            }
        }

        match best {
            Some((score, candidate)) if score >= self.auto_merge_threshold => {
                let already_contributed = candidate.source_id_for(record.source_type).is_some();
                let change_type = if already_contributed {
                    ChangeType::Update
                } else {
                    ChangeType::Merge
                };
                let (hearing, changed_fields) = merge_record(candidate, record, score);
                tracing::debug!(
                    committee = %record.committee_code,
                    hearing_id = %candidate.id,
                    score,
                    ?change_type,
                    "Auto-merging record into existing hearing"
                );
                DedupDecision::Merge {
                    hearing,
                    changed_fields,
                    score,
                    change_type,
                }
            }
            Some((score, candidate)) if score >= self.review_threshold => {
                tracing::info!(
                    committee = %record.committee_code,
                    nearest = %candidate.id,
                    score,
                    "Ambiguous match, flagging for review"
                );
                DedupDecision::Flag {
                    hearing: UnifiedHearing::from_record(record, score, ReviewStatus::NeedsReview),
                    score,
                    nearest: candidate.id,
                }
            }
            _ => DedupDecision::Create {
                hearing: UnifiedHearing::from_record(record, 1.0, ReviewStatus::Matched),
            },
        }
    }
}

/// Field-level merge of a record into an existing canonical hearing.
///
/// Deterministic function of the two inputs: re-merging the same record
/// always produces the same result regardless of call count.
pub fn merge_record(
    existing: &UnifiedHearing,
    record: &HearingRecord,
    score: f64,
) -> (UnifiedHearing, Vec<String>) {
    let mut merged = existing.clone();

    // The incoming record's scalars win when it is the API source, or
    // when the existing entity has no API contribution to defend (a
    // fresher scrape refreshing website-only data).
    let scalars_win = record.source_type == SourceType::Api || !existing.source_api;

    if scalars_win {
        merged.title = record.title.clone();
        if let Some(date) = record.date {
            merged.date = date;
        }
        if record.time.is_some() {
            merged.time = record.time.clone();
        }
        if record.location.is_some() {
            merged.location = record.location.clone();
        }
    } else {
        // Lower-priority source fills gaps only
        if merged.time.is_none() {
            merged.time = record.time.clone();
        }
        if merged.location.is_none() {
            merged.location = record.location.clone();
        }
    }

    merged.witnesses = union_by_key(&existing.witnesses, &record.witnesses, normalize_text);
    merged.documents = union_by_key(&existing.documents, &record.documents, canonical_url);
    merged.stream_urls = union_by_key(&existing.stream_urls, &record.stream_urls, canonical_url);

    match record.source_type {
        SourceType::Api => {
            merged.source_api = true;
            merged.congress_api_id = Some(record.source_id.clone());
            merged.api_checksum = Some(record.content_checksum.clone());
        }
        SourceType::Website => {
            merged.source_website = true;
            merged.committee_source_id = Some(record.source_id.clone());
            merged.website_checksum = Some(record.content_checksum.clone());
        }
    }

    merged.sync_confidence = score.clamp(0.0, 1.0);
    merged.last_synced_at = record.fetched_at;
    // A flagged row stays flagged until a human adjudicates it; a later
    // confident merge never resolves the review band on its own.
    if existing.review_status != ReviewStatus::NeedsReview {
        merged.review_status = ReviewStatus::Matched;
    }

    let changed_fields = diff_fields(existing, &merged);
    (merged, changed_fields)
}

/// Union two collections keyed on a normalized identity, sorted by key so
/// the result is independent of merge order.
fn union_by_key(existing: &[String], incoming: &[String], key_fn: fn(&str) -> String) -> Vec<String> {
    let mut items: Vec<(String, String)> = Vec::with_capacity(existing.len() + incoming.len());

    for value in existing.iter().chain(incoming.iter()) {
        let key = key_fn(value);
        if key.is_empty() {
            continue;
        }
        if !items.iter().any(|(k, _)| *k == key) {
            items.push((key, value.clone()));
        }
    }

    items.sort_by(|a, b| a.0.cmp(&b.0));
    items.into_iter().map(|(_, v)| v).collect()
}

/// Dedup key for URLs: trimmed, trailing slash dropped, case-folded.
/// Display form keeps the original spelling.
fn canonical_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

fn diff_fields(before: &UnifiedHearing, after: &UnifiedHearing) -> Vec<String> {
    let mut changed = Vec::new();

    if before.title != after.title {
        changed.push("title".to_string());
    }
    if before.date != after.date {
        changed.push("date".to_string());
    }
    if before.time != after.time {
        changed.push("time".to_string());
    }
    if before.location != after.location {
        changed.push("location".to_string());
    }
    if before.witnesses != after.witnesses {
        changed.push("witnesses".to_string());
    }
    if before.documents != after.documents {
        changed.push("documents".to_string());
    }
    if before.stream_urls != after.stream_urls {
        changed.push("stream_urls".to_string());
    }
    if before.source_api != after.source_api {
        changed.push("source_api".to_string());
    }
    if before.source_website != after.source_website {
        changed.push("source_website".to_string());
    }
    if before.review_status != after.review_status {
        changed.push("review_status".to_string());
    }

    changed
}
