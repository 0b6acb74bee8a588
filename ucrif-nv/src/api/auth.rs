//! Authentication middleware
//!
//! Validates the timestamp and hash fields every protected request body
//! carries, then restores the body for the downstream handler. A shared
//! secret of 0 disables all checking.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use ucrif_common::api::auth::{validate_hash, validate_timestamp, ApiAuthError};

use crate::AppState;

/// Limit body reads to keep a bad client from exhausting memory
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct AuthFields {
    timestamp: i64,
    hash: String,
}

/// Validate timestamp and hash on a protected route, 401 on failure
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    // Secret 0 disables all auth checking
    if state.shared_secret == 0 {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AuthRejection::ParseError(format!("Failed to read body: {}", e)))?;

    let json_value: Value = serde_json::from_slice(&body_bytes)
        .map_err(|e| AuthRejection::ParseError(format!("Invalid JSON: {}", e)))?;

    let auth_fields: AuthFields = serde_json::from_value(json_value.clone())
        .map_err(|e| AuthRejection::MissingFields(format!("Missing auth fields: {}", e)))?;

    validate_timestamp(auth_fields.timestamp).map_err(|e| match e {
        ApiAuthError::InvalidTimestamp { reason, .. } => AuthRejection::InvalidTimestamp(reason),
        _ => AuthRejection::Other(e.to_string()),
    })?;

    validate_hash(&auth_fields.hash, &json_value, state.shared_secret).map_err(|e| match e {
        ApiAuthError::InvalidHash {
            provided,
            calculated,
        } => {
            warn!(
                "Hash validation failed: provided={}, calculated={}",
                provided, calculated
            );
            AuthRejection::InvalidHash
        }
        _ => AuthRejection::Other(e.to_string()),
    })?;

    // Restore the body for the downstream handler
    let request = Request::from_parts(parts, Body::from(body_bytes));

    Ok(next.run(request).await)
}

/// Authentication failures mapped to HTTP responses
#[derive(Debug)]
pub enum AuthRejection {
    InvalidTimestamp(String),
    InvalidHash,
    MissingFields(String),
    ParseError(String),
    Other(String),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthRejection::InvalidTimestamp(reason) => (
                StatusCode::UNAUTHORIZED,
                format!("Invalid timestamp: {}", reason),
            ),
            AuthRejection::InvalidHash => (StatusCode::UNAUTHORIZED, "Invalid hash".to_string()),
            AuthRejection::MissingFields(msg) => (
                StatusCode::BAD_REQUEST,
                format!("Missing required fields: {}", msg),
            ),
            AuthRejection::ParseError(msg) => {
                (StatusCode::BAD_REQUEST, format!("Parse error: {}", msg))
            }
            AuthRejection::Other(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Authentication error: {}", msg),
            ),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
