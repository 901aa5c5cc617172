//! Library handlers: completed books and their archives.

use crate::api::AppState;
use crate::types::UserId;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

/// GET /users/:user_id/books - List completed books
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/books",
    tag = "books",
    params(
        ("user_id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "The user's completed books", body = Vec<crate::types::BookInfo>),
        (status = 500, description = "Internal server error", body = crate::error::ApiError)
    )
)]
pub async fn list_books(State(state): State<AppState>, Path(user_id): Path<i64>) -> Response {
    match state.downloader.list_books(UserId(user_id)).await {
        Ok(books) => (StatusCode::OK, Json(books)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /users/:user_id/books/:book_id/archive - Stream a book's zip archive
#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/books/{book_id}/archive",
    tag = "books",
    params(
        ("user_id" = i64, Path, description = "User ID"),
        ("book_id" = String, Path, description = "Provider catalog id")
    ),
    responses(
        (status = 200, description = "Zip archive", content_type = "application/zip"),
        (status = 404, description = "Book or archive not found", body = crate::error::ApiError)
    )
)]
pub async fn get_archive(
    State(state): State<AppState>,
    Path((user_id, book_id)): Path<(i64, String)>,
) -> Response {
    let path = match state
        .downloader
        .archive_path(UserId(user_id), &book_id)
        .await
    {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) => return crate::Error::Io(e).into_response(),
    };
    let length = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(e) => return crate::Error::Io(e).into_response(),
    };

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.zip", book_id));
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    tracing::debug!(user_id, book_id = %book_id, bytes = length, "Streaming archive");

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

/// DELETE /users/:user_id/books/:book_id - Delete a book and its files
#[utoipa::path(
    delete,
    path = "/api/v1/users/{user_id}/books/{book_id}",
    tag = "books",
    params(
        ("user_id" = i64, Path, description = "User ID"),
        ("book_id" = String, Path, description = "Provider catalog id")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found", body = crate::error::ApiError)
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    Path((user_id, book_id)): Path<(i64, String)>,
) -> Response {
    match state
        .downloader
        .delete_book(UserId(user_id), &book_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
