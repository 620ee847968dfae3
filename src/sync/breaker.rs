//! Circuit breaker transitions
//!
//! Pure transition logic over [`CircuitBreakerState`]; persistence lives
//! in `db::breakers` and event emission in the orchestrator. Each
//! (committee, source) pair has its own breaker so a dead committee
//! website never blocks API syncs for that committee, or anything for
//! any other committee.
//!
//! Closed -> Open after `failure_threshold` consecutive availability
//! failures. Open -> HalfOpen once the recovery window has fully
//! elapsed; the half-open probe's outcome decides between Closed and a
//! fresh Open window.

use chrono::{DateTime, Duration, Utc};

use crate::models::{BreakerState, CircuitBreakerState};

/// Breaker thresholds, shared by every breaker in the deployment.
#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub recovery_window: Duration,
}

impl BreakerPolicy {
    pub fn new(failure_threshold: u32, recovery_secs: u64) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_window: Duration::seconds(recovery_secs as i64),
        }
    }

    /// Whether a fetch may proceed right now. An open breaker whose
    /// recovery window has elapsed transitions to half-open here and
    /// admits exactly the probe request.
    ///
    /// Returns true when the request is allowed; the state may have been
    /// mutated either way, so callers persist it after the call.
    pub fn allow_request(&self, state: &mut CircuitBreakerState, now: DateTime<Utc>) -> bool {
        match state.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let window_elapsed = state.open_until.map_or(true, |until| now >= until);
                if window_elapsed {
                    tracing::info!(
                        committee = %state.committee_code,
                        source = %state.source,
                        "Circuit breaker half-open, probing source"
                    );
                    state.state = BreakerState::HalfOpen;
                    state.open_until = None;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful fetch. Resets the failure count; a half-open
    /// probe success closes the breaker.
    pub fn record_success(&self, state: &mut CircuitBreakerState) {
        if state.state != BreakerState::Closed {
            tracing::info!(
                committee = %state.committee_code,
                source = %state.source,
                "Circuit breaker closed, source recovered"
            );
        }
        state.state = BreakerState::Closed;
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    /// Record an availability failure. Trips the breaker at exactly the
    /// failure threshold; a half-open probe failure re-opens immediately
    /// with a fresh recovery window.
    pub fn record_failure(&self, state: &mut CircuitBreakerState, now: DateTime<Utc>) {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);

        let trip = match state.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => state.consecutive_failures >= self.failure_threshold,
            BreakerState::Open => false,
        };

        if trip {
            state.state = BreakerState::Open;
            state.open_until = Some(now + self.recovery_window);
            tracing::warn!(
                committee = %state.committee_code,
                source = %state.source,
                consecutive_failures = state.consecutive_failures,
                open_until = %state.open_until.unwrap(),
                "Circuit breaker opened"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn policy() -> BreakerPolicy {
        BreakerPolicy::new(5, 7200)
    }

    fn fresh() -> CircuitBreakerState {
        CircuitBreakerState::new("SSJU", SourceType::Website)
    }

    #[test]
    fn opens_at_exactly_the_threshold() {
        let policy = policy();
        let mut state = fresh();
        let now = Utc::now();

        for i in 1..=4 {
            policy.record_failure(&mut state, now);
            assert_eq!(state.state, BreakerState::Closed, "after failure {}", i);
            assert!(policy.allow_request(&mut state, now));
        }

        policy.record_failure(&mut state, now);
        assert_eq!(state.state, BreakerState::Open);
        assert_eq!(state.consecutive_failures, 5);
        assert!(!policy.allow_request(&mut state, now));
    }

    #[test]
    fn stays_open_until_recovery_window_elapses() {
        let policy = policy();
        let mut state = fresh();
        let opened_at = Utc::now();

        for _ in 0..5 {
            policy.record_failure(&mut state, opened_at);
        }
        assert_eq!(state.state, BreakerState::Open);

        // One second short of the window: still blocked
        let almost = opened_at + Duration::seconds(7199);
        assert!(!policy.allow_request(&mut state, almost));
        assert_eq!(state.state, BreakerState::Open);

        // Window elapsed: exactly one probe admitted, state half-open
        let elapsed = opened_at + Duration::seconds(7200);
        assert!(policy.allow_request(&mut state, elapsed));
        assert_eq!(state.state, BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_probe_success_closes() {
        let policy = policy();
        let mut state = fresh();
        let now = Utc::now();

        for _ in 0..5 {
            policy.record_failure(&mut state, now);
        }
        let later = now + Duration::seconds(7201);
        assert!(policy.allow_request(&mut state, later));

        policy.record_success(&mut state);
        assert_eq!(state.state, BreakerState::Closed);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.open_until.is_none());
    }

    #[test]
    fn half_open_probe_failure_reopens_with_fresh_window() {
        let policy = policy();
        let mut state = fresh();
        let now = Utc::now();

        for _ in 0..5 {
            policy.record_failure(&mut state, now);
        }
        let probe_time = now + Duration::seconds(8000);
        assert!(policy.allow_request(&mut state, probe_time));

        policy.record_failure(&mut state, probe_time);
        assert_eq!(state.state, BreakerState::Open);
        assert_eq!(
            state.open_until.unwrap(),
            probe_time + Duration::seconds(7200)
        );
    }

    #[test]
    fn success_resets_partial_failure_streak() {
        let policy = policy();
        let mut state = fresh();
        let now = Utc::now();

        for _ in 0..4 {
            policy.record_failure(&mut state, now);
        }
        policy.record_success(&mut state);
        assert_eq!(state.consecutive_failures, 0);

        // A later single failure doesn't trip
        policy.record_failure(&mut state, now);
        assert_eq!(state.state, BreakerState::Closed);
    }
}
