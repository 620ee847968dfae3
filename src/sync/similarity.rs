//! Similarity scorer
//!
//! Pure, symmetric scoring of two hearing-shaped values into [0,1].
//! Weighted sum: title 0.40, date proximity 0.30, metadata 0.20,
//! witness overlap 0.10 (weights configurable).
//!
//! The scorer never decides anything; classification against thresholds
//! belongs to the deduplication engine. Committee-code equality is a
//! candidacy precondition enforced by the orchestrator, but the metadata
//! component still zeroes out on a mismatch so the function is total.

use chrono::NaiveDate;
use std::collections::HashSet;

use crate::config::ScoreWeights;
use crate::models::{HearingRecord, UnifiedHearing};

/// Field access shared by ephemeral records and canonical hearings so
/// both sides of a comparison can be either shape.
pub trait HearingLike {
    fn committee_code(&self) -> &str;
    fn title(&self) -> &str;
    fn date(&self) -> Option<NaiveDate>;
    fn location(&self) -> Option<&str>;
    fn witnesses(&self) -> &[String];
}

impl HearingLike for HearingRecord {
    fn committee_code(&self) -> &str {
        &self.committee_code
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn date(&self) -> Option<NaiveDate> {
        self.date
    }
    fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
    fn witnesses(&self) -> &[String] {
        &self.witnesses
    }
}

impl HearingLike for UnifiedHearing {
    fn committee_code(&self) -> &str {
        &self.committee_code
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn date(&self) -> Option<NaiveDate> {
        Some(self.date)
    }
    fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
    fn witnesses(&self) -> &[String] {
        &self.witnesses
    }
}

/// Weighted similarity of two hearing-shaped values, in [0,1].
pub fn score(a: &impl HearingLike, b: &impl HearingLike, weights: &ScoreWeights) -> f64 {
    let total = weights.title * title_similarity(a.title(), b.title())
        + weights.date * date_proximity(a.date(), b.date())
        + weights.metadata * metadata_match(a, b)
        + weights.witnesses * witness_overlap(a.witnesses(), b.witnesses());

    total.clamp(0.0, 1.0)
}

/// Case-fold, strip punctuation, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Title similarity: exact normalized match is 1.0; otherwise the better
/// of token-set Jaccard and Jaro-Winkler on the normalized strings.
/// Token-set catches reordered phrasing ("Hearing on X" vs "X Hearing");
/// Jaro-Winkler catches typos and truncation.
fn title_similarity(a: &str, b: &str) -> f64 {
    let na = normalize_text(a);
    let nb = normalize_text(b);

    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }

    let tokens_a: HashSet<&str> = na.split(' ').collect();
    let tokens_b: HashSet<&str> = nb.split(' ').collect();
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    let token_overlap = if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    };

    let edit_ratio = strsim::jaro_winkler(&na, &nb);

    token_overlap.max(edit_ratio)
}

/// Date proximity: exact 1.0, adjacent day 0.5, anything else (or a
/// missing date) 0.0.
fn date_proximity(a: Option<NaiveDate>, b: Option<NaiveDate>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let days = (a - b).num_days().abs();
            match days {
                0 => 1.0,
                1 => 0.5,
                _ => 0.0,
            }
        }
        _ => 0.0,
    }
}

/// Metadata match. Committee codes must be identical for any credit.
/// Conflicting locations keep 0.75 rather than 0: the same event is
/// often annotated with a room on one source and a building on the
/// other, and a location disagreement alone must not sink an otherwise
/// identical title+date pair below the auto-merge threshold.
fn metadata_match(a: &impl HearingLike, b: &impl HearingLike) -> f64 {
    if a.committee_code() != b.committee_code() {
        return 0.0;
    }

    match (a.location(), b.location()) {
        (Some(la), Some(lb)) => {
            if normalize_text(la) == normalize_text(lb) {
                1.0
            } else {
                0.75
            }
        }
        // Either side absent counts as a match
        _ => 1.0,
    }
}

/// Jaccard similarity of normalized witness-name sets. Neutral 0.5 when
/// either side has no witnesses, so sparse records aren't penalized.
fn witness_overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.5;
    }

    let set_a: HashSet<String> = a.iter().map(|w| normalize_text(w)).collect();
    let set_b: HashSet<String> = b.iter().map(|w| normalize_text(w)).collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.5;
    }
    intersection as f64 / union as f64
}
