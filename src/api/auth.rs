//! Authentication middleware for the REST API
//!
//! Provides optional API key authentication via X-Api-Key header.
//! When ApiConfig::api_key is set, all requests must include a matching
//! X-Api-Key header or they will receive a 401 Unauthorized response.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

/// Middleware that requires a matching `X-Api-Key` header when a key is configured
///
/// Missing or wrong keys get a 401 with an [`ApiError`] body.
///
/// # Examples
///
/// ```no_run
/// use axum::{Router, middleware};
/// use audiobook_dl::api::auth::require_api_key;
///
/// let api_key = Some("secret-key-123".to_string());
/// let router: Router = Router::new()
///     .layer(middleware::from_fn_with_state(
///         api_key,
///         require_api_key
///     ));
/// ```
pub async fn require_api_key(
    State(expected_api_key): State<Option<String>>,
    request: Request,
    next: Next,
) -> Response {
    // If no API key is configured, allow all requests through
    let Some(expected_key) = expected_api_key else {
        return next.run(request).await;
    };

    // Extract the X-Api-Key header
    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());

    match api_key_header {
        Some(provided_key)
            if constant_time_eq(provided_key.as_bytes(), expected_key.as_bytes()) =>
        {
            next.run(request).await
        }
        Some(_) => unauthorized_response("Invalid API key"),
        None => unauthorized_response("Missing X-Api-Key header"),
    }
}

/// Constant-time byte comparison to prevent timing side-channel attacks.
/// Always compares all bytes regardless of where the first mismatch occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// 401 with the same JSON error body every other failure uses
fn unauthorized_response(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ApiError::unauthorized(message))).into_response()
}
