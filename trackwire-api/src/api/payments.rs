//! Payment-provider webhook
//!
//! Raw-body endpoint the provider calls after checkout completes. The
//! signature header is checked against the configured secret before the
//! payload is trusted; fulfillment itself is idempotent on the provider's
//! event id, so at-least-once delivery is safe.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use trackwire_common::CodeKind;

use crate::fulfillment::FulfillmentError;
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-payment-signature";
const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    #[serde(default)]
    metadata: WebhookMetadata,
}

/// Provider metadata is string-typed throughout
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookMetadata {
    user_id: Option<String>,
    code_type: Option<String>,
    quantity: Option<String>,
}

/// POST /payments/webhook
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, WebhookError> {
    if !state.webhook_secret.is_empty() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(WebhookError::MissingSignature)?;
        if signature != state.webhook_secret {
            return Err(WebhookError::BadSignature);
        }
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

    if event.event_type != CHECKOUT_COMPLETED {
        info!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event type");
        return Ok(Json(json!({ "received": true })));
    }

    let metadata = event.data.object.metadata;
    let user_id: i64 = metadata
        .user_id
        .as_deref()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| WebhookError::MalformedPayload("missing or invalid userId".to_string()))?;
    let kind = metadata
        .code_type
        .as_deref()
        .and_then(CodeKind::parse)
        .ok_or_else(|| WebhookError::MalformedPayload("missing or invalid codeType".to_string()))?;
    let quantity: u32 = metadata
        .quantity
        .as_deref()
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| WebhookError::MalformedPayload("missing or invalid quantity".to_string()))?;

    // Duplicate deliveries come back Ok(Duplicate) and are acknowledged
    // normally; the provider must not keep retrying them.
    state
        .fulfillment
        .on_payment_confirmed(&event.id, user_id, kind, quantity)
        .await
        .map_err(WebhookError::Fulfillment)?;

    Ok(Json(json!({ "received": true })))
}

/// Webhook errors
#[derive(Debug)]
pub enum WebhookError {
    MissingSignature,
    BadSignature,
    MalformedPayload(String),
    Fulfillment(FulfillmentError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WebhookError::MissingSignature => {
                (StatusCode::BAD_REQUEST, "Missing webhook signature".to_string())
            }
            WebhookError::BadSignature => {
                (StatusCode::BAD_REQUEST, "Invalid webhook signature".to_string())
            }
            WebhookError::MalformedPayload(msg) => {
                (StatusCode::BAD_REQUEST, format!("Webhook error: {}", msg))
            }
            WebhookError::Fulfillment(e) => {
                error!(%e, "Webhook fulfillment failed");
                // 5xx so the provider redelivers; the failed claim was
                // released, so the retry actually issues.
                (StatusCode::INTERNAL_SERVER_ERROR, "Fulfillment failed".to_string())
            }
        };
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}
