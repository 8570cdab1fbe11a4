//! trackwire-api library — distribution backend service
//!
//! Code issuance (ISRC/UPC ledger), release records, platform fan-out, and
//! payment-webhook fulfillment, exposed over HTTP.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use trackwire_common::events::EventBus;

pub mod api;
pub mod distributor;
pub mod fulfillment;
pub mod ledger;
pub mod notify;
pub mod store;

use distributor::{Distributor, PlatformClient};
use fulfillment::PurchaseFulfillment;
use ledger::{CodeGenerator, CodeLedger};
use store::ReleaseStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub bus: EventBus,
    pub ledger: CodeLedger,
    pub store: ReleaseStore,
    pub distributor: Distributor,
    pub fulfillment: PurchaseFulfillment,
    /// Shared secret for payment-webhook signatures; empty disables the check
    pub webhook_secret: String,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        bus: EventBus,
        generator: CodeGenerator,
        clients: Vec<Arc<dyn PlatformClient>>,
        webhook_secret: String,
    ) -> Self {
        let ledger = CodeLedger::new(db.clone(), bus.clone(), generator);
        let store = ReleaseStore::new(db.clone(), bus.clone());
        let distributor = Distributor::new(store.clone(), clients);
        let fulfillment = PurchaseFulfillment::new(db.clone(), ledger.clone(), bus.clone());
        Self {
            db,
            bus,
            ledger,
            store,
            distributor,
            fulfillment,
            webhook_secret,
        }
    }
}

/// Build application router
///
/// All `/api` routes require a session token; the health endpoint and the
/// provider-signed payment webhook do not.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let protected = Router::new()
        .route("/api/codes/purchase", post(api::codes::purchase_codes))
        .route("/api/codes/available", get(api::codes::available_codes))
        .route("/api/codes/validate", post(api::codes::validate_code))
        .route("/api/codes/:id", get(api::codes::get_code))
        .route(
            "/api/codes/distribution/:id",
            get(api::codes::codes_by_distribution),
        )
        .route(
            "/api/distribution",
            post(api::distribution::create_distribution)
                .get(api::distribution::list_distributions),
        )
        .route(
            "/api/distribution/:id/status",
            get(api::distribution::distribution_status),
        )
        .route(
            "/api/distribution/:id/assign-codes",
            post(api::distribution::assign_codes),
        )
        .route(
            "/api/distribution/:id/cancel",
            post(api::distribution::cancel_distribution),
        )
        .route(
            "/api/distribution/:id/analytics",
            get(api::distribution::distribution_analytics),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::auth_middleware,
        ));

    let public = Router::new()
        .route("/payments/webhook", post(api::payments::payment_webhook))
        .merge(api::health::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
