//! Notification listener
//!
//! Fire-and-forget side channel: subscribes to the event bus and hands
//! purchase confirmations to the delivery system (a structured log line
//! here; a mail relay in a full deployment). Delivery problems are logged
//! and never reach the operation that emitted the event.

use tokio::task::JoinHandle;
use tracing::{info, warn};
use trackwire_common::events::{EventBus, TrackwireEvent};

/// Spawn the notification listener task
pub fn spawn_notification_listener(bus: &EventBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(TrackwireEvent::CodeIssued { user_id, kind, value, .. }) => {
                    info!(user_id, kind = %kind, code = %value, "Queued code purchase confirmation");
                }
                Ok(TrackwireEvent::PurchaseFulfilled { user_id, issued, event_id, .. }) => {
                    info!(user_id, issued, event_id = %event_id, "Queued purchase receipt");
                }
                Ok(TrackwireEvent::DistributionCancelled { distribution_id, .. }) => {
                    info!(distribution_id, "Queued cancellation notice");
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification listener lagged, dropping events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
