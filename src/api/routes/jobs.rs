//! Job handlers: submission, listing, lookup, deletion.

use super::SubmitJobsRequest;
use crate::api::AppState;
use crate::types::{JobId, UserId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /users/:user_id/jobs - Submit books for download
#[utoipa::path(
    post,
    path = "/api/v1/users/{user_id}/jobs",
    tag = "jobs",
    params(
        ("user_id" = i64, Path, description = "User ID")
    ),
    request_body = SubmitJobsRequest,
    responses(
        (status = 201, description = "At least one job created", body = crate::types::EnqueueResult),
        (status = 200, description = "Nothing new: every book already active or in the library", body = crate::types::EnqueueResult),
        (status = 400, description = "Invalid book request", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn submit_jobs(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<SubmitJobsRequest>,
) -> Response {
    match state
        .downloader
        .enqueue(UserId(user_id), request.books)
        .await
    {
        Ok(result) => {
            let status = if result.created.is_empty() {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, Json(result)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// GET /users/:user_id/jobs - List jobs in creation order
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/jobs",
    tag = "jobs",
    params(
        ("user_id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "The user's jobs, oldest first", body = Vec<crate::types::JobInfo>),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn list_jobs(State(state): State<AppState>, Path(user_id): Path<i64>) -> Response {
    match state.downloader.list_jobs(UserId(user_id)).await {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /users/:user_id/jobs/:id - Get one job
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/jobs/{id}",
    tag = "jobs",
    params(
        ("user_id" = i64, Path, description = "User ID"),
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job information", body = crate::types::JobInfo),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(i64, i64)>,
) -> Response {
    match state.downloader.get_job(UserId(user_id), JobId(id)).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /users/:user_id/jobs/:id - Delete a job, cancelling it if running
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}/jobs/{id}",
    tag = "jobs",
    params(
        ("user_id" = i64, Path, description = "User ID"),
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 204, description = "Job deleted"),
        (status = 404, description = "Job not found", body = crate::error::ApiError)
    )
)]
pub async fn delete_job(
    State(state): State<AppState>,
    Path((user_id, id)): Path<(i64, i64)>,
) -> Response {
    match state.downloader.delete_job(UserId(user_id), JobId(id)).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
