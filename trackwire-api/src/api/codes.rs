//! Code purchase and lookup endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use trackwire_common::CodeKind;

use crate::api::auth::CurrentUser;
use crate::ledger::{validate_format, Code, LedgerError};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub code_type: String,
    pub quantity: u32,
}

/// POST /api/codes/purchase
///
/// Synchronous purchase path (distinct from the payment-webhook path):
/// issues the requested batch and returns it.
pub async fn purchase_codes(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Response, CodesError> {
    let kind = parse_kind(&request.code_type)?;
    let codes = state.ledger.issue(user_id, kind, request.quantity).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": {
                "message": format!("Successfully purchased {} {} codes", codes.len(), kind),
                "codes": codes,
            }
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// GET /api/codes/available?type=
pub async fn available_codes(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Query(query): Query<AvailableQuery>,
) -> Result<Json<serde_json::Value>, CodesError> {
    let filter = match &query.kind {
        Some(raw) => Some(parse_kind(raw)?),
        None => None,
    };

    let mut upc_codes: Vec<Code> = Vec::new();
    let mut isrc_codes: Vec<Code> = Vec::new();
    if filter.is_none() || filter == Some(CodeKind::Upc) {
        upc_codes = state.ledger.find_available(user_id, CodeKind::Upc).await?;
    }
    if filter.is_none() || filter == Some(CodeKind::Isrc) {
        isrc_codes = state.ledger.find_available(user_id, CodeKind::Isrc).await?;
    }

    Ok(Json(json!({
        "status": "success",
        "data": {
            "upcCodes": upc_codes,
            "isrcCodes": isrc_codes,
        }
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub code_type: String,
    pub code_value: String,
}

/// POST /api/codes/validate
///
/// Format check for externally supplied code values; no ledger lookup.
pub async fn validate_code(
    State(_state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<serde_json::Value>, CodesError> {
    let kind = parse_kind(&request.code_type)?;
    let is_valid = validate_format(kind, &request.code_value);

    Ok(Json(json!({
        "status": "success",
        "data": {
            "isValid": is_valid,
            "message": if is_valid { "Code format is valid" } else { "Invalid code format" },
        }
    })))
}

/// GET /api/codes/:id
pub async fn get_code(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(code_id): Path<i64>,
) -> Result<Json<serde_json::Value>, CodesError> {
    let code = state.ledger.find_by_id(code_id).await?;
    match code {
        // Another user's code is indistinguishable from a missing one
        Some(code) if code.user_id == user_id => Ok(Json(json!({
            "status": "success",
            "data": code,
        }))),
        _ => Err(CodesError::Ledger(LedgerError::NotFound(code_id))),
    }
}

/// GET /api/codes/distribution/:id
pub async fn codes_by_distribution(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(distribution_id): Path<i64>,
) -> Result<Json<serde_json::Value>, CodesError> {
    let codes: Vec<Code> = state
        .ledger
        .find_by_distribution(distribution_id)
        .await?
        .into_iter()
        .filter(|code| code.user_id == user_id)
        .collect();

    Ok(Json(json!({
        "status": "success",
        "data": codes,
    })))
}

fn parse_kind(raw: &str) -> Result<CodeKind, CodesError> {
    CodeKind::parse(raw).ok_or_else(|| CodesError::InvalidCodeType(raw.to_string()))
}

/// Code endpoint errors
#[derive(Debug)]
pub enum CodesError {
    InvalidCodeType(String),
    Ledger(LedgerError),
}

impl From<LedgerError> for CodesError {
    fn from(e: LedgerError) -> Self {
        CodesError::Ledger(e)
    }
}

impl IntoResponse for CodesError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            CodesError::InvalidCodeType(raw) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "error", "message": format!("Invalid code type: {}", raw) }),
            ),
            CodesError::Ledger(e) => ledger_error_response(e),
        };
        (status, Json(body)).into_response()
    }
}

/// Map ledger errors onto user-actionable responses
///
/// Conflict variants stay distinguishable; a partial issue reports the codes
/// that did persist instead of discarding them.
pub(crate) fn ledger_error_response(e: LedgerError) -> (StatusCode, serde_json::Value) {
    match e {
        LedgerError::InvalidQuantity(_) => (
            StatusCode::BAD_REQUEST,
            json!({ "status": "error", "message": e.to_string() }),
        ),
        LedgerError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            json!({ "status": "error", "message": "Code not found" }),
        ),
        LedgerError::NotOwned { .. } => (
            StatusCode::FORBIDDEN,
            json!({ "status": "error", "message": "Code belongs to another user" }),
        ),
        LedgerError::AlreadyUsed(_) => (
            StatusCode::CONFLICT,
            json!({ "status": "error", "message": "Code already used" }),
        ),
        LedgerError::PartialIssue { ref issued, requested, .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "status": "error",
                "message": format!("Issued {} of {} codes before failure", issued.len(), requested),
                "data": { "codes": issued },
            }),
        ),
        LedgerError::GenerationExhausted { .. } | LedgerError::Database(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "status": "error", "message": e.to_string() }),
        ),
    }
}
