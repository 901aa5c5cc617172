//! System handlers: health, capabilities, OpenAPI, events.

use super::EventsQuery;
use crate::api::AppState;
use crate::types::{Event, UserId};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_jobs": state.downloader.active_job_count().await,
    }))
}

/// GET /capabilities - Whether the transcode and probe tools are available
#[utoipa::path(
    get,
    path = "/api/v1/capabilities",
    tag = "system",
    responses(
        (status = 200, description = "Current tool availability", body = crate::types::Capabilities)
    )
)]
pub async fn get_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.downloader.capabilities()))
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/api/v1/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// SSE event name for an event
fn event_name(event: &Event) -> &'static str {
    match event {
        Event::Queued { .. } => "queued",
        Event::Removed { .. } => "removed",
        Event::StageChanged { .. } => "stage_changed",
        Event::Progress { .. } => "progress",
        Event::ChapterConverted { .. } => "chapter_converted",
        Event::Completed { .. } => "completed",
        Event::Failed { .. } => "failed",
        Event::BookRemoved { .. } => "book_removed",
        Event::Shutdown => "shutdown",
    }
}

/// True when `event` belongs in a stream restricted to `user`
fn concerns(event: &Event, user: Option<UserId>) -> bool {
    match (user, event.user_id()) {
        (Some(user), Some(owner)) => user == owner,
        _ => true,
    }
}

/// GET /events - Server-sent events stream
///
/// Without `user_id` every user's job events are streamed.
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "system",
    params(
        ("user_id" = Option<i64>, Query, description = "Only stream events of this user")
    ),
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = BroadcastStream::new(state.downloader.subscribe());
    let only_user = query.user_id.map(UserId);

    let sse_stream = stream.filter_map(move |result| match result {
        Ok(event) if !concerns(&event, only_user) => None,
        Ok(event) => match serde_json::to_string(&event) {
            Ok(data) => Some(Ok(SseEvent::default().event(event_name(&event)).data(data))),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize event");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE client lagged");
            Some(Ok(SseEvent::default()
                .event("error")
                .data(json!({"error": "lagged", "skipped": skipped}).to_string())))
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
