//! Event types for the StylePick event system
//!
//! Events are emitted after the owning transaction commits. Downstream
//! consumers (catalog statistics, recommendation, analytics) subscribe; the
//! tournament core never waits on them.

mod session_types;

pub use session_types::SessionStatus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// StylePick event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StyleEvent {
    /// A new tournament session was created
    TournamentStarted {
        session_id: Uuid,
        user_id: String,
        category: String,
        /// Bracket size actually used (largest power of two available)
        tournament_size: u32,
        timestamp: DateTime<Utc>,
    },

    /// A matchup was resolved and appended to the choice ledger
    ///
    /// Triggers:
    /// - Catalog: view/selection statistics (eventually consistent)
    /// - Analytics: decision latency tracking
    ChoiceRecorded {
        session_id: Uuid,
        round_number: u32,
        winner_id: Uuid,
        loser_id: Uuid,
        response_time_ms: u64,
        is_speed_bonus: bool,
        /// Candidates still in the queue after this choice
        remaining: usize,
        timestamp: DateTime<Utc>,
    },

    /// Session moved between lifecycle statuses (pause, resume, abandon)
    SessionStatusChanged {
        session_id: Uuid,
        old_status: SessionStatus,
        new_status: SessionStatus,
        timestamp: DateTime<Utc>,
    },

    /// The reduction collapsed to one candidate and the result was written
    ///
    /// Triggers:
    /// - Recommendation: refresh the user's style profile
    TournamentCompleted {
        session_id: Uuid,
        user_id: String,
        category: String,
        champion_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl StyleEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> Uuid {
        match self {
            StyleEvent::TournamentStarted { session_id, .. }
            | StyleEvent::ChoiceRecorded { session_id, .. }
            | StyleEvent::SessionStatusChanged { session_id, .. }
            | StyleEvent::TournamentCompleted { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast bus for [`StyleEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StyleEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<StyleEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: StyleEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<StyleEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StyleEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let session_id = Uuid::new_v4();

        bus.emit(StyleEvent::SessionStatusChanged {
            session_id,
            old_status: SessionStatus::Active,
            new_status: SessionStatus::Paused,
            timestamp: Utc::now(),
        })
        .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.session_id(), session_id);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        let event = StyleEvent::TournamentCompleted {
            session_id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            category: "cores".to_string(),
            champion_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };

        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = StyleEvent::TournamentStarted {
            session_id: Uuid::nil(),
            user_id: "u1".to_string(),
            category: "estilos".to_string(),
            tournament_size: 8,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "TournamentStarted");
        assert_eq!(json["tournament_size"], 8);
    }
}
