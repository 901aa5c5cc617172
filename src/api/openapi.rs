//! OpenAPI document for the REST API, generated at compile time with utoipa.

use utoipa::OpenApi;

/// OpenAPI documentation for the REST API
///
/// Served at:
/// - `/api/v1/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "audiobook-dl REST API",
        version = "0.1.0",
        description = "Submit audiobook jobs, follow their progress and fetch the finished chapter archives",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790/api/v1", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::submit_jobs,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::delete_job,

        // Books
        crate::api::routes::list_books,
        crate::api::routes::get_archive,
        crate::api::routes::delete_book,

        // Session
        crate::api::routes::put_session,

        // System
        crate::api::routes::health_check,
        crate::api::routes::get_capabilities,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::JobId,
        crate::types::UserId,
        crate::types::Status,
        crate::types::BookRequest,
        crate::types::EnqueueResult,
        crate::types::JobInfo,
        crate::types::BookInfo,
        crate::types::Event,
        crate::types::Capabilities,
        crate::error::FailureKind,

        crate::session::SessionUpdate,
        crate::api::routes::SubmitJobsRequest,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Job submission, progress and deletion"),
        (name = "books", description = "Completed books and archive download"),
        (name = "session", description = "Provider session hand-off from the login service"),
        (name = "system", description = "Health, capabilities, events and the OpenAPI document"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security addon to add API key authentication scheme to OpenAPI spec
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = &mut openapi.components {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}
