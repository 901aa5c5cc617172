//! REST API server module
//!
//! Exposes job submission, job and book management, the provider session
//! hand-off and a live event stream over HTTP.

use crate::{AudiobookDownloader, Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Jobs
/// - `POST /users/:user_id/jobs` - Submit books (`{created, existing, skipped}`)
/// - `GET /users/:user_id/jobs` - List jobs in creation order
/// - `GET /users/:user_id/jobs/:id` - Get single job
/// - `DELETE /users/:user_id/jobs/:id` - Delete job (cancels it when running)
///
/// ## Books
/// - `GET /users/:user_id/books` - List completed books
/// - `GET /users/:user_id/books/:book_id/archive` - Download the zip archive
/// - `DELETE /users/:user_id/books/:book_id` - Delete book and files
///
/// ## Session
/// - `PUT /users/:user_id/session` - Store the provider session
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /capabilities` - Tool availability
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(downloader: Arc<AudiobookDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let router = Router::new()
        // Jobs
        .route("/users/:user_id/jobs", post(routes::submit_jobs))
        .route("/users/:user_id/jobs", get(routes::list_jobs))
        .route("/users/:user_id/jobs/:id", get(routes::get_job))
        .route("/users/:user_id/jobs/:id", delete(routes::delete_job))
        // Books
        .route("/users/:user_id/books", get(routes::list_books))
        .route(
            "/users/:user_id/books/:book_id/archive",
            get(routes::get_archive),
        )
        .route("/users/:user_id/books/:book_id", delete(routes::delete_book))
        // Session
        .route("/users/:user_id/session", put(routes::put_session))
        // System
        .route("/health", get(routes::health_check))
        .route("/capabilities", get(routes::get_capabilities))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // Swagger UI serves its own copy of the document so it does not collide
    // with /openapi.json
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state);

    let router = if config.api.api_key.is_some() {
        router.layer(middleware::from_fn_with_state(
            config.api.api_key.clone(),
            auth::require_api_key,
        ))
    } else {
        router
    };

    let router = if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Build a CORS layer for the configured origins (`"*"` or an empty list allows any)
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the listener fails or the task is aborted.
///
/// # Example
///
/// ```no_run
/// use audiobook_dl::{AudiobookDownloader, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(AudiobookDownloader::new((*config).clone()).await?);
/// let _processor = downloader.start_queue_processor();
///
/// audiobook_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(
    downloader: Arc<AudiobookDownloader>,
    config: Arc<Config>,
) -> Result<()> {
    let bind_address = config.api.bind_address;
    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
