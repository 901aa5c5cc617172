//! Database layer for audiobook-dl
//!
//! Handles SQLite persistence for jobs, completed books and provider sessions.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`jobs`] - Job store (create / get / list / guarded update / delete, restart recovery)
//! - [`books`] - Completed book records
//! - [`sessions`] - Per-user provider sessions written by the login collaborator
//! - [`state`] - Runtime state (shutdown tracking)

use crate::types::{BookInfo, JobId, JobInfo, Status, UserId};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod books;
mod jobs;
mod migrations;
mod sessions;
mod state;

pub use jobs::JobUpdate;

/// Error message stored on jobs that a restart found mid-flight
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

/// Job record from database
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    /// Store-assigned, strictly increasing ID
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Provider catalog id
    pub book_id: String,
    /// Display title
    pub title: String,
    /// Status code (see [`Status::to_i32`])
    pub status: i32,
    /// Overall progress (0–100)
    pub progress: i64,
    /// Error message if the job failed
    pub error_message: Option<String>,
    /// Archive path, set only when the job completed
    pub output_path: Option<String>,
    /// Unix timestamp when the job was created
    pub created_at: i64,
    /// Unix timestamp of the last write
    pub updated_at: i64,
}

impl Job {
    /// Typed job id
    pub fn job_id(&self) -> JobId {
        JobId(self.id)
    }

    /// Typed owner id
    pub fn owner(&self) -> UserId {
        UserId(self.user_id)
    }

    /// Decoded status
    pub fn status(&self) -> Status {
        Status::from_i32(self.status)
    }

    /// Progress clamped into 0–100
    pub fn progress(&self) -> u8 {
        self.progress.clamp(0, 100) as u8
    }
}

impl From<Job> for JobInfo {
    fn from(row: Job) -> Self {
        JobInfo {
            id: row.job_id(),
            user_id: row.owner(),
            status: row.status(),
            progress: row.progress(),
            book_id: row.book_id,
            title: row.title,
            error: row.error_message,
            output_path: row.output_path.map(PathBuf::from),
            created_at: timestamp(row.created_at),
            updated_at: timestamp(row.updated_at),
        }
    }
}

/// Book to be registered when a job completes
#[derive(Debug, Clone)]
pub struct NewBook {
    /// Owning user
    pub user_id: UserId,
    /// Provider catalog id
    pub book_id: String,
    /// Book title
    pub title: String,
    /// Author(s)
    pub author: String,
    /// Path to the finished archive
    pub archive_path: PathBuf,
    /// Number of chapter files in the archive
    pub chapter_count: u32,
}

/// Book record from database
#[derive(Debug, Clone, FromRow)]
pub struct Book {
    /// Unique database ID
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    /// Provider catalog id
    pub book_id: String,
    /// Book title
    pub title: String,
    /// Author(s)
    pub author: String,
    /// Path to the finished archive
    pub archive_path: String,
    /// Number of chapter files in the archive
    pub chapter_count: i64,
    /// Job that produced this book
    pub job_id: i64,
    /// Unix timestamp when the book was registered
    pub created_at: i64,
}

impl From<Book> for BookInfo {
    fn from(row: Book) -> Self {
        BookInfo {
            user_id: UserId(row.user_id),
            book_id: row.book_id,
            title: row.title,
            author: row.author,
            archive_path: PathBuf::from(row.archive_path),
            chapter_count: row.chapter_count.max(0) as u32,
            created_at: timestamp(row.created_at),
        }
    }
}

/// Provider session record from database
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    /// Owning user
    pub user_id: i64,
    /// Bearer token for the provider API
    pub access_token: String,
    /// Account activation bytes (hex) for legacy containers
    pub activation_bytes: Option<String>,
    /// Unix timestamp after which the token is no longer valid
    pub expires_at: Option<i64>,
    /// Unix timestamp of the last hand-off
    pub updated_at: i64,
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// Database handle for audiobook-dl
pub struct Database {
    pool: SqlitePool,
}
