//! Authentication middleware
//!
//! Token mechanics live in the upstream auth flow; this service only
//! resolves a bearer token to a user id via the `sessions` table. Handlers
//! read the resolved identity from the [`CurrentUser`] request extension.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// Authenticated caller identity, inserted by the middleware
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub i64);

/// Authentication middleware for `/api` routes
///
/// Returns 401 unless the request carries `Authorization: Bearer <token>`
/// for a known session.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)?
        .to_string();

    let user_id: Option<i64> =
        sqlx::query_scalar("SELECT user_id FROM sessions WHERE token = ?")
            .bind(&token)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;

    match user_id {
        Some(user_id) => {
            request.extensions_mut().insert(CurrentUser(user_id));
            Ok(next.run(request).await)
        }
        None => {
            warn!("Rejected request with unknown session token");
            Err(AuthError::InvalidToken)
        }
    }
}

/// Authentication errors
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    Database(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid session token".to_string()),
            AuthError::Database(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Auth lookup failed: {}", msg))
            }
        };
        (status, Json(json!({ "status": "error", "message": message }))).into_response()
    }
}
