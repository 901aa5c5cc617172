//! Session hand-off from the login collaborator.

use crate::api::AppState;
use crate::session::SessionUpdate;
use crate::types::UserId;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// PUT /users/:user_id/session - Store the user's provider session
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/session",
    tag = "session",
    params(
        ("user_id" = i64, Path, description = "User ID")
    ),
    request_body = SessionUpdate,
    responses(
        (status = 204, description = "Session stored"),
        (status = 400, description = "Malformed session", body = crate::error::ApiError)
    )
)]
pub async fn put_session(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(update): Json<SessionUpdate>,
) -> Response {
    match state.downloader.set_session(UserId(user_id), &update).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
