//! Event bus for change notifications
//!
//! Downstream consumers (transcript pipeline, review UI) observe committed
//! changes through this bus; the SSE endpoint re-exposes it over HTTP.
//! Built on tokio::broadcast: non-blocking publish, multiple subscribers,
//! lag detection for slow consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{BreakerState, ChangeType, SourceType};

/// Events emitted by the sync core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HearingEvent {
    /// Emitted exactly once per committed store change
    HearingCommitted {
        hearing_id: Uuid,
        committee_code: String,
        change_type: ChangeType,
        timestamp: DateTime<Utc>,
    },

    /// A committee's reconciliation cycle finished
    SyncCycleCompleted {
        committee_code: String,
        discovered: usize,
        created: usize,
        merged: usize,
        updated: usize,
        flagged: usize,
        skipped: usize,
        errors: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A circuit breaker changed position
    CircuitBreakerChanged {
        committee_code: String,
        source: SourceType,
        state: BreakerState,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },
}

impl HearingEvent {
    /// SSE event name for this variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            HearingEvent::HearingCommitted { .. } => "HearingCommitted",
            HearingEvent::SyncCycleCompleted { .. } => "SyncCycleCompleted",
            HearingEvent::CircuitBreakerChanged { .. } => "CircuitBreakerChanged",
        }
    }
}

/// Central event distribution bus.
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HearingEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events before dropping the
    /// oldest for lagging subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<HearingEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscribers case. Committed-change
    /// notifications use this: the commit stands whether or not anyone is
    /// listening right now.
    pub fn emit_lossy(&self, event: HearingEvent) {
        if let Err(broadcast::error::SendError(dropped)) = self.tx.send(event) {
            tracing::trace!(?dropped, "event emitted with no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_committed_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let id = Uuid::new_v4();
        bus.emit_lossy(HearingEvent::HearingCommitted {
            hearing_id: id,
            committee_code: "SSJU".into(),
            change_type: ChangeType::Create,
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            HearingEvent::HearingCommitted { hearing_id, .. } => assert_eq!(hearing_id, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_not_an_error() {
        let bus = EventBus::new(4);
        bus.emit_lossy(HearingEvent::SyncCycleCompleted {
            committee_code: "SCOM".into(),
            discovered: 0,
            created: 0,
            merged: 0,
            updated: 0,
            flagged: 0,
            skipped: 0,
            errors: 0,
            duration_ms: 1,
            timestamp: Utc::now(),
        });
    }
}
