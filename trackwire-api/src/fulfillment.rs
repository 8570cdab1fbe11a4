//! Purchase fulfillment
//!
//! Bridges a payment-provider confirmation event to a batch issue in the
//! code ledger. Providers deliver webhooks at least once, so fulfillment is
//! idempotent on the provider's event id: the `payment_events` primary key
//! arbitrates, and a repeat delivery is acknowledged without reissuing. A
//! fulfillment that issues nothing releases its claim, so a redelivery of
//! that event retries issuance rather than being deduped.

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};
use trackwire_common::events::{EventBus, TrackwireEvent};
use trackwire_common::CodeKind;

use crate::ledger::{CodeLedger, LedgerError};

/// How a confirmation event was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    /// First delivery; codes issued
    Fulfilled { issued: usize },
    /// Codes issued for part of the batch before a failure; issued codes stand
    PartiallyFulfilled { issued: usize, requested: u32 },
    /// Event id seen before; nothing issued
    Duplicate,
}

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Payment-confirmation fulfillment service
#[derive(Clone)]
pub struct PurchaseFulfillment {
    db: SqlitePool,
    ledger: CodeLedger,
    bus: EventBus,
}

impl PurchaseFulfillment {
    pub fn new(db: SqlitePool, ledger: CodeLedger, bus: EventBus) -> Self {
        Self { db, ledger, bus }
    }

    /// Process one payment-confirmed event, at most once per `event_id`
    pub async fn on_payment_confirmed(
        &self,
        event_id: &str,
        user_id: i64,
        kind: CodeKind,
        quantity: u32,
    ) -> Result<FulfillmentOutcome, FulfillmentError> {
        // Claim the event id first; zero rows means another delivery of the
        // same event already claimed it.
        let claimed = sqlx::query(
            r#"
            INSERT OR IGNORE INTO payment_events (event_id, user_id, code_type, quantity, processed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(kind)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.db)
        .await?
        .rows_affected();

        if claimed == 0 {
            info!(event_id, "Duplicate payment event, skipping issuance");
            return Ok(FulfillmentOutcome::Duplicate);
        }

        match self.ledger.issue(user_id, kind, quantity).await {
            Ok(codes) => {
                self.bus.emit(TrackwireEvent::PurchaseFulfilled {
                    event_id: event_id.to_string(),
                    user_id,
                    kind,
                    issued: codes.len(),
                    timestamp: Utc::now(),
                });
                info!(event_id, user_id, kind = %kind, issued = codes.len(), "Fulfilled purchase");
                Ok(FulfillmentOutcome::Fulfilled { issued: codes.len() })
            }
            // No fulfillment-level retry: codes issued before the failure
            // stand, the shortfall is logged for operator follow-up.
            Err(LedgerError::PartialIssue { issued, requested, cause }) => {
                warn!(
                    event_id,
                    user_id,
                    issued = issued.len(),
                    requested,
                    %cause,
                    "Purchase fulfilled partially"
                );
                Ok(FulfillmentOutcome::PartiallyFulfilled {
                    issued: issued.len(),
                    requested,
                })
            }
            // Nothing was issued: release the claim so the provider's
            // redelivery of this event can retry issuance instead of being
            // swallowed as a duplicate.
            Err(e) => {
                error!(event_id, user_id, %e, "Purchase fulfillment failed, releasing event claim");
                self.release_claim(event_id).await;
                Err(e.into())
            }
        }
    }

    async fn release_claim(&self, event_id: &str) {
        if let Err(e) = sqlx::query("DELETE FROM payment_events WHERE event_id = ?")
            .bind(event_id)
            .execute(&self.db)
            .await
        {
            // The claim row outlives the failure; the shortfall needs
            // operator follow-up since redeliveries will now be deduped.
            error!(event_id, %e, "Could not release claim for failed fulfillment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CodeGenerator;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use trackwire_common::db::init_memory_database;

    async fn setup() -> (SqlitePool, PurchaseFulfillment) {
        let pool = init_memory_database().await.expect("init db");
        sqlx::query("INSERT INTO users (email, created_at) VALUES ('a@b.c', '2026-01-01')")
            .execute(&pool)
            .await
            .expect("seed user");
        let bus = EventBus::new(64);
        let generator = CodeGenerator::with_rng("US", "ABC", StdRng::seed_from_u64(7));
        let ledger = CodeLedger::new(pool.clone(), bus.clone(), generator);
        let fulfillment = PurchaseFulfillment::new(pool.clone(), ledger, bus);
        (pool, fulfillment)
    }

    #[tokio::test]
    async fn first_delivery_issues_codes() {
        let (pool, fulfillment) = setup().await;

        let outcome = fulfillment
            .on_payment_confirmed("evt_001", 1, CodeKind::Upc, 3)
            .await
            .expect("fulfill");
        assert_eq!(outcome, FulfillmentOutcome::Fulfilled { issued: 3 });

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM codes WHERE user_id = 1")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn repeat_delivery_does_not_reissue() {
        let (pool, fulfillment) = setup().await;

        fulfillment
            .on_payment_confirmed("evt_002", 1, CodeKind::Isrc, 2)
            .await
            .expect("first delivery");
        let outcome = fulfillment
            .on_payment_confirmed("evt_002", 1, CodeKind::Isrc, 2)
            .await
            .expect("second delivery");
        assert_eq!(outcome, FulfillmentOutcome::Duplicate);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM codes WHERE user_id = 1")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn distinct_events_fulfill_independently() {
        let (pool, fulfillment) = setup().await;

        fulfillment
            .on_payment_confirmed("evt_003", 1, CodeKind::Upc, 1)
            .await
            .expect("first event");
        fulfillment
            .on_payment_confirmed("evt_004", 1, CodeKind::Upc, 1)
            .await
            .expect("second event");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM codes WHERE user_id = 1")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn invalid_quantity_is_a_ledger_error() {
        let (_pool, fulfillment) = setup().await;
        let result = fulfillment
            .on_payment_confirmed("evt_005", 1, CodeKind::Upc, 0)
            .await;
        assert!(matches!(
            result,
            Err(FulfillmentError::Ledger(LedgerError::InvalidQuantity(0)))
        ));
    }

    #[tokio::test]
    async fn failed_fulfillment_releases_claim_for_redelivery() {
        let (pool, fulfillment) = setup().await;

        // First delivery claims the event id, then issues nothing
        let result = fulfillment
            .on_payment_confirmed("evt_006", 1, CodeKind::Upc, 0)
            .await;
        assert!(result.is_err());

        let claims: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM payment_events WHERE event_id = 'evt_006'")
                .fetch_one(&pool)
                .await
                .expect("count claims");
        assert_eq!(claims, 0, "failed fulfillment must not keep the claim");

        // The provider's redelivery must retry issuance, not come back Duplicate
        let outcome = fulfillment
            .on_payment_confirmed("evt_006", 1, CodeKind::Upc, 2)
            .await
            .expect("redelivery fulfills");
        assert_eq!(outcome, FulfillmentOutcome::Fulfilled { issued: 2 });

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM codes WHERE user_id = 1")
            .fetch_one(&pool)
            .await
            .expect("count codes");
        assert_eq!(count, 2);
    }
}
