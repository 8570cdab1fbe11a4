//! Release creation, status polling, code assignment, cancellation

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use trackwire_common::{CodeKind, Platform};

use crate::api::auth::CurrentUser;
use crate::api::codes::ledger_error_response;
use crate::distributor::ReleaseMetadata;
use crate::ledger::LedgerError;
use crate::store::{Distribution, NewDistribution, StoreError};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDistributionRequest {
    pub title: String,
    pub artist: String,
    pub file_url: String,
    pub cover_art_url: String,
    pub isrc_code: Option<String>,
    pub upc_code: Option<String>,
    // Per-user platform tokens from the linked-accounts flow
    pub youtube_token: Option<String>,
    pub spotify_token: Option<String>,
    pub soundcloud_token: Option<String>,
}

/// POST /api/distribution
///
/// Creates the release record, then starts the platform fan-out in the
/// background; the response carries only the new id. Clients poll
/// `/status` for per-platform progress.
pub async fn create_distribution(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(request): Json<CreateDistributionRequest>,
) -> Result<Response, DistributionError> {
    for (field, value) in [
        ("title", &request.title),
        ("artist", &request.artist),
        ("fileUrl", &request.file_url),
        ("coverArtUrl", &request.cover_art_url),
    ] {
        if value.trim().is_empty() {
            return Err(DistributionError::Validation(format!("{} is required", field)));
        }
    }

    let distribution = state
        .store
        .create(NewDistribution {
            user_id,
            title: request.title.clone(),
            artist: request.artist.clone(),
            file_url: request.file_url.clone(),
            cover_art_url: Some(request.cover_art_url.clone()),
            isrc_code: request.isrc_code.clone(),
            upc_code: request.upc_code.clone(),
        })
        .await?;

    let metadata = ReleaseMetadata {
        title: request.title.clone(),
        artist: request.artist.clone(),
        description: format!("{} by {}", request.title, request.artist),
        tags: vec![request.artist.clone(), "music".to_string(), "new release".to_string()],
        youtube_token: request.youtube_token,
        spotify_token: request.spotify_token,
        soundcloud_token: request.soundcloud_token,
    };

    // Fire-and-forget: the handler does not wait for the fan-out
    let distributor = state.distributor.clone();
    let distribution_id = distribution.id;
    let file_url = request.file_url;
    tokio::spawn(async move {
        distributor
            .distribute_to_all(distribution_id, &file_url, &metadata)
            .await;
    });

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": {
                "distributionId": distribution.id,
                "message": "Distribution process started",
            }
        })),
    )
        .into_response())
}

/// GET /api/distribution
pub async fn list_distributions(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, DistributionError> {
    let distributions = state.store.find_by_user(user_id).await?;
    Ok(Json(json!({
        "status": "success",
        "data": distributions,
    })))
}

/// GET /api/distribution/:id/status
///
/// Idempotent snapshot of per-platform status for polling clients.
pub async fn distribution_status(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(distribution_id): Path<i64>,
) -> Result<Json<serde_json::Value>, DistributionError> {
    let _ = owned_distribution(&state, distribution_id, user_id).await?;
    let snapshot = state.distributor.check_distribution_status(distribution_id).await?;
    Ok(Json(json!({
        "status": "success",
        "data": snapshot,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignCodesRequest {
    pub isrc_code: Option<i64>,
    pub upc_code: Option<i64>,
}

/// POST /api/distribution/:id/assign-codes
///
/// Assigns owned, unused codes by id. Each assignment is atomic in the
/// ledger; the code value is then recorded on the release row.
pub async fn assign_codes(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(distribution_id): Path<i64>,
    Json(request): Json<AssignCodesRequest>,
) -> Result<Json<serde_json::Value>, DistributionError> {
    let _ = owned_distribution(&state, distribution_id, user_id).await?;

    for (code_id, kind) in [
        (request.isrc_code, CodeKind::Isrc),
        (request.upc_code, CodeKind::Upc),
    ]
    .into_iter()
    .filter_map(|(id, kind)| id.map(|id| (id, kind)))
    {
        // Assignment is one-way, so a kind mismatch must be caught before
        // the conditional update consumes the code. Races on the code are
        // still arbitrated by the guarded update inside `assign`.
        if let Some(code) = state.ledger.find_by_id(code_id).await? {
            if code.code_type != kind {
                return Err(DistributionError::Validation(format!(
                    "Code {} is a {} code, not {}",
                    code_id, code.code_type, kind
                )));
            }
        }
        let assigned = state.ledger.assign(code_id, distribution_id, user_id).await?;
        state
            .store
            .attach_code(distribution_id, kind, &assigned.code_value)
            .await?;
    }

    let distribution = owned_distribution(&state, distribution_id, user_id).await?;
    Ok(Json(json!({
        "status": "success",
        "data": {
            "message": "Codes assigned successfully",
            "distribution": distribution,
        }
    })))
}

/// POST /api/distribution/:id/cancel
///
/// Force-cancels every platform. Idempotent; does not abort in-flight
/// publish calls, but their late results cannot overwrite `cancelled`.
pub async fn cancel_distribution(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(distribution_id): Path<i64>,
) -> Result<Json<serde_json::Value>, DistributionError> {
    let _ = owned_distribution(&state, distribution_id, user_id).await?;
    state.store.cancel(distribution_id).await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Distribution cancelled successfully",
    })))
}

/// GET /api/distribution/:id/analytics
///
/// Fail-soft: a platform with no data or a provider error reports null.
pub async fn distribution_analytics(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(distribution_id): Path<i64>,
) -> Result<Json<serde_json::Value>, DistributionError> {
    let _ = owned_distribution(&state, distribution_id, user_id).await?;

    let mut data = serde_json::Map::new();
    for platform in Platform::ALL {
        let analytics = state.distributor.get_analytics(distribution_id, platform).await;
        data.insert(
            platform.as_str().to_string(),
            serde_json::to_value(&analytics).unwrap_or(serde_json::Value::Null),
        );
    }

    Ok(Json(json!({
        "status": "success",
        "data": data,
    })))
}

/// Load a distribution, 404 unless it exists and belongs to the caller
async fn owned_distribution(
    state: &AppState,
    distribution_id: i64,
    user_id: i64,
) -> Result<Distribution, DistributionError> {
    match state.store.find_by_id(distribution_id).await? {
        Some(distribution) if distribution.user_id == user_id => Ok(distribution),
        _ => Err(DistributionError::NotFound(distribution_id)),
    }
}

/// Distribution endpoint errors
#[derive(Debug)]
pub enum DistributionError {
    NotFound(i64),
    Validation(String),
    Store(StoreError),
    Ledger(LedgerError),
}

impl From<StoreError> for DistributionError {
    fn from(e: StoreError) -> Self {
        DistributionError::Store(e)
    }
}

impl From<LedgerError> for DistributionError {
    fn from(e: LedgerError) -> Self {
        DistributionError::Ledger(e)
    }
}

impl IntoResponse for DistributionError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            DistributionError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({ "status": "error", "message": "Distribution not found" }),
            ),
            DistributionError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "error", "message": message }),
            ),
            DistributionError::Store(StoreError::NotFound(_)) => (
                StatusCode::NOT_FOUND,
                json!({ "status": "error", "message": "Distribution not found" }),
            ),
            DistributionError::Store(e @ StoreError::IllegalTransition { .. }) => (
                StatusCode::CONFLICT,
                json!({ "status": "error", "message": e.to_string() }),
            ),
            DistributionError::Store(e) => {
                error!(%e, "Store error in distribution handler");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "status": "error", "message": "Internal error" }),
                )
            }
            DistributionError::Ledger(e) => ledger_error_response(e),
        };
        (status, Json(body)).into_response()
    }
}
