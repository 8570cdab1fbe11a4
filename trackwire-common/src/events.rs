//! Event types for the trackwire event system
//!
//! Provides shared event definitions and the EventBus used as the
//! fire-and-forget notification side channel. Delivery failures are a
//! subscriber concern; emitters never propagate them.

use crate::types::{CodeKind, Platform, PlatformStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Trackwire event types
///
/// Events are broadcast via the EventBus. The notification listener turns
/// `CodeIssued` into purchase-confirmation dispatches; other subscribers
/// (status pages, audit logging) consume the distribution events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TrackwireEvent {
    /// A catalog code was persisted for a user
    ///
    /// Emitted exactly once per issued code, after the row is committed.
    CodeIssued {
        code_id: i64,
        user_id: i64,
        kind: CodeKind,
        value: String,
        timestamp: DateTime<Utc>,
    },

    /// One platform's distribution status changed
    PlatformStatusChanged {
        distribution_id: i64,
        platform: Platform,
        status: PlatformStatus,
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A distribution was force-cancelled across all platforms
    DistributionCancelled {
        distribution_id: i64,
        timestamp: DateTime<Utc>,
    },

    /// A payment-provider event was fulfilled (codes issued in batch)
    PurchaseFulfilled {
        event_id: String,
        user_id: i64,
        kind: CodeKind,
        issued: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus shared by all components
///
/// Thin wrapper over `tokio::sync::broadcast`: every subscriber receives
/// every event emitted after it subscribed; slow subscribers drop old events
/// rather than applying backpressure to emitters.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TrackwireEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<TrackwireEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// A send error only means there are currently no subscribers; that is
    /// normal during startup and in tests, so it is logged at debug level
    /// and swallowed.
    pub fn emit(&self, event: TrackwireEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("No subscribers for event: {:?}", e.0);
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit(TrackwireEvent::DistributionCancelled {
            distribution_id: 1,
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(TrackwireEvent::CodeIssued {
            code_id: 7,
            user_id: 42,
            kind: CodeKind::Upc,
            value: "004815162342".to_string(),
            timestamp: Utc::now(),
        });

        match rx.recv().await.expect("event delivered") {
            TrackwireEvent::CodeIssued { code_id, user_id, .. } => {
                assert_eq!(code_id, 7);
                assert_eq!(user_id, 42);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
