//! Core types for audiobook-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Unique identifier for a job (store-assigned, strictly increasing)
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

/// Identifier of the user owning jobs, books and a provider session
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

macro_rules! sqlite_i64_newtype {
    ($name:ident) => {
        impl $name {
            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

sqlite_i64_newtype!(JobId);
sqlite_i64_newtype!(UserId);

/// Job status
///
/// Jobs move strictly forward: `queued → downloading → converting → zipping → completed`,
/// with `failed` reachable from every non-terminal status. Removal is not a status:
/// a deleted job's record is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Waiting for a free worker
    Queued,
    /// Fetching the container and chapter metadata
    Downloading,
    /// Splitting and transcoding chapters
    Converting,
    /// Building the archive
    Zipping,
    /// Archive built and book registered
    Completed,
    /// Failed with a captured error
    Failed,
}

impl Status {
    /// Every status that still has work ahead of it
    pub const ACTIVE: [Status; 4] = [
        Status::Queued,
        Status::Downloading,
        Status::Converting,
        Status::Zipping,
    ];

    /// Statuses that mean a worker is executing the job
    pub const RUNNING: [Status; 3] = [Status::Downloading, Status::Converting, Status::Zipping];

    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Queued,
            1 => Status::Downloading,
            2 => Status::Converting,
            3 => Status::Zipping,
            4 => Status::Completed,
            5 => Status::Failed,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Queued => 0,
            Status::Downloading => 1,
            Status::Converting => 2,
            Status::Zipping => 3,
            Status::Completed => 4,
            Status::Failed => 5,
        }
    }

    /// Lowercase name, as used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Downloading => "downloading",
            Status::Converting => "converting",
            Status::Zipping => "zipping",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    /// True for `completed` and `failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    /// True while a worker owns the job
    pub fn is_running(&self) -> bool {
        Self::RUNNING.contains(self)
    }

    /// Whether the transition table allows moving from `self` to `next`.
    ///
    /// Staying in the same non-terminal status is allowed (progress updates).
    pub fn can_transition_to(&self, next: Status) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next || next == Status::Failed {
            return true;
        }
        matches!(
            (self, next),
            (Status::Queued, Status::Downloading)
                | (Status::Downloading, Status::Converting)
                | (Status::Converting, Status::Zipping)
                | (Status::Zipping, Status::Completed)
        )
    }

    /// Statuses from which `next` may be entered (used for guarded SQL updates)
    pub fn predecessors(next: Status) -> Vec<Status> {
        Self::ACTIVE
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// The slice of the 0–100 progress scale owned by this phase
    pub fn progress_range(&self) -> (u8, u8) {
        match self {
            Status::Queued => (0, 0),
            Status::Downloading => (0, 50),
            Status::Converting => (50, 95),
            Status::Zipping => (95, 100),
            Status::Completed => (100, 100),
            Status::Failed => (0, 100),
        }
    }

    /// Map a phase-local fraction (0.0–1.0) into the job's overall progress
    pub fn scale_progress(&self, fraction: f64) -> u8 {
        let (start, end) = self.progress_range();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let span = f64::from(end - start);
        start + (span * fraction).floor() as u8
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested book in a job submission
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BookRequest {
    /// Provider-assigned catalog id
    pub book_id: String,
    /// Display title; the book id is used when absent
    #[serde(default)]
    pub title: Option<String>,
}

impl BookRequest {
    /// Request a book by id only
    pub fn new(book_id: impl Into<String>) -> Self {
        Self {
            book_id: book_id.into(),
            title: None,
        }
    }

    /// Attach a display title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// The title to store on the job
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.book_id)
    }
}

/// Outcome of a job submission
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EnqueueResult {
    /// Jobs created by this call
    pub created: Vec<JobId>,
    /// Already-active jobs that matched a requested book (re-submission is a no-op)
    pub existing: Vec<JobId>,
    /// Book ids skipped because a completed book already exists
    pub skipped: Vec<String>,
}

/// Job information returned by listings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Job ID
    pub id: JobId,
    /// Owning user
    pub user_id: UserId,
    /// Provider catalog id
    pub book_id: String,
    /// Display title
    pub title: String,
    /// Current status
    pub status: Status,
    /// Overall progress (0–100)
    pub progress: u8,
    /// Captured failure message
    pub error: Option<String>,
    /// Archive path, set only on success
    pub output_path: Option<PathBuf>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the job was last written
    pub updated_at: DateTime<Utc>,
}

/// Completed book information
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BookInfo {
    /// Owning user
    pub user_id: UserId,
    /// Provider catalog id
    pub book_id: String,
    /// Book title
    pub title: String,
    /// Author(s), comma separated
    pub author: String,
    /// Path to the packaged archive
    pub archive_path: PathBuf,
    /// Number of chapter files in the archive
    pub chapter_count: u32,
    /// When the book was registered
    pub created_at: DateTime<Utc>,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job created and queued
    Queued {
        /// Job ID
        id: JobId,
        /// Owning user
        user_id: UserId,
        /// Provider catalog id
        book_id: String,
        /// Display title
        title: String,
    },

    /// Job record removed by a delete request
    Removed {
        /// Job ID
        id: JobId,
        /// Owning user
        user_id: UserId,
    },

    /// Job moved to a new pipeline stage
    StageChanged {
        /// Job ID
        id: JobId,
        /// Owning user
        user_id: UserId,
        /// New status
        status: Status,
    },

    /// Overall progress advanced
    Progress {
        /// Job ID
        id: JobId,
        /// Owning user
        user_id: UserId,
        /// Current status
        status: Status,
        /// Overall progress (0–100)
        progress: u8,
    },

    /// A chapter finished converting
    ChapterConverted {
        /// Job ID
        id: JobId,
        /// Owning user
        user_id: UserId,
        /// 1-based chapter sequence number
        index: usize,
        /// Total chapters in the plan
        total: usize,
    },

    /// Job completed and book registered
    Completed {
        /// Job ID
        id: JobId,
        /// Owning user
        user_id: UserId,
        /// Provider catalog id
        book_id: String,
        /// Archive path
        archive_path: PathBuf,
    },

    /// Job failed
    Failed {
        /// Job ID
        id: JobId,
        /// Owning user
        user_id: UserId,
        /// Failure classification
        kind: crate::error::FailureKind,
        /// Captured error message
        error: String,
    },

    /// Book record and files removed
    BookRemoved {
        /// Owning user
        user_id: UserId,
        /// Provider catalog id
        book_id: String,
    },

    /// Downloader is shutting down
    Shutdown,
}

impl Event {
    /// User the event concerns; `None` for process-wide events
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Event::Queued { user_id, .. }
            | Event::Removed { user_id, .. }
            | Event::StageChanged { user_id, .. }
            | Event::Progress { user_id, .. }
            | Event::ChapterConverted { user_id, .. }
            | Event::Completed { user_id, .. }
            | Event::Failed { user_id, .. }
            | Event::BookRemoved { user_id, .. } => Some(*user_id),
            Event::Shutdown => None,
        }
    }
}

/// Availability of the external tools
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    /// Name of the transcoder implementation in use
    pub transcoder: String,
    /// Whether chapters can be converted
    pub can_convert: bool,
    /// Whether containers can be probed for duration/bitrate
    pub can_probe: bool,
}
