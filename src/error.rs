//! Error types for audiobook-dl
//!
//! This module provides the error taxonomy used by the job pipeline:
//! - Failure kinds a job can end with (auth, network, conversion, storage)
//! - Store-level errors (database, job state machine violations)
//! - HTTP status code mapping for the REST API
//! - Structured error responses with machine-readable error codes

use crate::types::{JobId, Status};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for audiobook-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for audiobook-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "work_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Provider session is missing, invalid or expired.
    ///
    /// Never retried: the user must re-authenticate before resubmitting.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Transient transfer failure (timeouts, connection resets, 5xx responses)
    #[error("network error: {0}")]
    Network(String),

    /// HTTP client error that has not been classified yet
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The transcode tool failed
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Disk or filesystem failure while writing output or packaging
    #[error("storage error: {0}")]
    Storage(String),

    /// A non-terminal job already exists for this (user, book) pair
    #[error("job {existing} is already active for book {book_id}")]
    DuplicateActiveJob {
        /// The book identifier that was requested
        book_id: String,
        /// The job currently holding the (user, book) slot
        existing: JobId,
    },

    /// The book is already in the user's library
    #[error("book {book_id} is already in the library")]
    AlreadyInLibrary {
        /// The book identifier that was requested
        book_id: String,
    },

    /// Job state machine violation or lookup failure
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Resource not found (book, session, archive)
    #[error("not found: {0}")]
    NotFound(String),

    /// The job was cancelled by a delete request
    #[error("job cancelled")]
    Cancelled,

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the operation
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// External tool could not be executed (missing binary, spawn failure)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Job lifecycle errors raised by the job store
#[derive(Debug, Error)]
pub enum JobError {
    /// Job not found (never existed, or removed by a delete request)
    #[error("job {id} not found")]
    NotFound {
        /// The job ID that was not found
        id: JobId,
    },

    /// The requested status change is not in the transition table
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// The job whose transition was rejected
        id: JobId,
        /// Current status
        from: Status,
        /// Requested status
        to: Status,
    },

    /// A progress write would move progress backwards
    #[error("job {id} progress cannot go from {current} back to {requested}")]
    ProgressRegression {
        /// The job whose update was rejected
        id: JobId,
        /// Progress currently stored
        current: u8,
        /// Progress that was requested
        requested: u8,
    },
}

/// Errors raised while converting the container into chapter files
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The transcode tool failed on one chapter
    #[error("chapter {index} ({title}) failed: {reason}")]
    ChapterFailed {
        /// 1-based chapter sequence number
        index: usize,
        /// Sanitized chapter title
        title: String,
        /// The tool's failure reason (stderr tail or exit status)
        reason: String,
    },

    /// Decryption material was missing or incomplete
    #[error("missing decryption material: {0}")]
    MissingDecryptionMaterial(String),

    /// The transcode tool is not installed or not configured
    #[error("transcode tool not available: {0}")]
    ToolNotAvailable(String),

    /// The produced output file is missing or empty
    #[error("no output produced at {path}")]
    MissingOutput {
        /// Expected output path
        path: PathBuf,
    },
}

/// Coarse classification of a job failure, used for logging and the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Session invalid or expired
    Auth,
    /// Network transfer failed after retries
    Network,
    /// Transcode tool failed
    Conversion,
    /// Disk / filesystem failure
    Storage,
    /// Cancelled by a delete request
    Cancelled,
    /// Anything else (database, bugs)
    Internal,
}

impl Error {
    /// Classify this error into the failure kinds a job can end with.
    ///
    /// Raw I/O errors surface from filesystem work inside a stage, so they
    /// count as storage failures.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Error::Auth(_) => FailureKind::Auth,
            Error::Network(_) | Error::Http(_) => FailureKind::Network,
            Error::Conversion(_) | Error::ExternalTool(_) => FailureKind::Conversion,
            Error::Storage(_) | Error::Io(_) | Error::InsufficientSpace { .. } => {
                FailureKind::Storage
            }
            Error::Cancelled => FailureKind::Cancelled,
            Error::Job(JobError::NotFound { .. }) => FailureKind::Cancelled,
            _ => FailureKind::Internal,
        }
    }

    /// Build a storage error from an I/O error with a short description of what was attempted
    pub fn storage(what: impl std::fmt::Display, err: std::io::Error) -> Self {
        Error::Storage(format!("{}: {}", what, err))
    }

    /// True when this error means the job record is gone or the job was cancelled
    pub fn is_cancellation(&self) -> bool {
        self.failure_kind() == FailureKind::Cancelled
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "job_not_found",
///     "message": "job error: job 123 not found",
///     "details": { "job_id": 123 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "unauthorized" error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,

            Error::NotFound(_) => 404,
            Error::Job(JobError::NotFound { .. }) => 404,
            Error::Database(DatabaseError::NotFound(_)) => 404,

            Error::DuplicateActiveJob { .. } => 409,
            Error::AlreadyInLibrary { .. } => 409,
            Error::Job(JobError::InvalidTransition { .. }) => 409,
            Error::Job(JobError::ProgressRegression { .. }) => 409,

            Error::Auth(_) => 401,

            Error::Conversion(_) => 422,
            Error::InsufficientSpace { .. } => 507,
            Error::Storage(_) => 507,

            Error::Network(_) | Error::Http(_) => 502,

            Error::ShuttingDown => 503,
            Error::ExternalTool(_) => 503,
            Error::Cancelled => 410,

            Error::Database(_)
            | Error::Sqlx(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Auth(_) => "auth_error",
            Error::Network(_) | Error::Http(_) => "network_error",
            Error::Conversion(e) => match e {
                ConversionError::ChapterFailed { .. } => "chapter_conversion_failed",
                ConversionError::MissingDecryptionMaterial(_) => "missing_decryption_material",
                ConversionError::ToolNotAvailable(_) => "tool_not_available",
                ConversionError::MissingOutput { .. } => "missing_output",
            },
            Error::Storage(_) => "storage_error",
            Error::DuplicateActiveJob { .. } => "duplicate_active_job",
            Error::AlreadyInLibrary { .. } => "already_in_library",
            Error::Job(e) => match e {
                JobError::NotFound { .. } => "job_not_found",
                JobError::InvalidTransition { .. } => "invalid_transition",
                JobError::ProgressRegression { .. } => "progress_regression",
            },
            Error::NotFound(_) => "not_found",
            Error::Cancelled => "cancelled",
            Error::ShuttingDown => "shutting_down",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::ExternalTool(_) => "external_tool_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Job(JobError::NotFound { id }) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Job(JobError::InvalidTransition { id, from, to }) => Some(serde_json::json!({
                "job_id": id,
                "from": from,
                "to": to,
            })),
            Error::DuplicateActiveJob { book_id, existing } => Some(serde_json::json!({
                "book_id": book_id,
                "existing_job_id": existing,
            })),
            Error::AlreadyInLibrary { book_id } => Some(serde_json::json!({
                "book_id": book_id,
            })),
            Error::Conversion(ConversionError::ChapterFailed { index, title, .. }) => {
                Some(serde_json::json!({
                    "chapter": index,
                    "title": title,
                }))
            }
            Error::InsufficientSpace {
                required,
                available,
            } => Some(serde_json::json!({
                "required_bytes": required,
                "available_bytes": available,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
