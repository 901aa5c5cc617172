//! Job store: creation with the active-job uniqueness check, guarded updates,
//! deletion and restart recovery.

use crate::error::{DatabaseError, JobError};
use crate::types::{JobId, Status, UserId};
use crate::{Error, Result};

use super::{Database, INTERRUPTED_BY_RESTART, Job};

const JOB_COLUMNS: &str = "id, user_id, book_id, title, status, progress, error_message, \
                           output_path, created_at, updated_at";

/// A status/progress write for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    /// Status to move to (may equal the current status for progress-only writes)
    pub status: Status,
    /// New overall progress; `None` keeps the stored value
    pub progress: Option<u8>,
    /// Error message to record
    pub error: Option<String>,
}

impl JobUpdate {
    /// Move to `status`, keeping progress
    pub fn status(status: Status) -> Self {
        Self {
            status,
            progress: None,
            error: None,
        }
    }

    /// Report progress within `status`
    pub fn progress(status: Status, progress: u8) -> Self {
        Self {
            status,
            progress: Some(progress.min(100)),
            error: None,
        }
    }

    /// Fail with a captured message; progress freezes at its current value
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            progress: None,
            error: Some(error.into()),
        }
    }
}

/// Comma-separated status codes for an SQL `IN (...)` list
fn status_list(statuses: &[Status]) -> String {
    statuses
        .iter()
        .map(|s| s.to_i32().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Database {
    /// Create a queued job for (user, book).
    ///
    /// The active-job check, the library check and the insert are one
    /// `INSERT ... WHERE NOT EXISTS` statement, so SQLite serializes it against
    /// every other writer; the partial unique index on `jobs(user_id, book_id)`
    /// backs it up. A conflict is reported as [`Error::DuplicateActiveJob`]
    /// carrying the job that holds the slot, a book already in the library as
    /// [`Error::AlreadyInLibrary`].
    pub async fn create_job(&self, user_id: UserId, book_id: &str, title: &str) -> Result<JobId> {
        let sql = format!(
            r#"
            INSERT INTO jobs (user_id, book_id, title, status, progress, created_at, updated_at)
            SELECT ?, ?, ?, ?, 0, ?, ?
            WHERE NOT EXISTS (
                SELECT 1 FROM jobs WHERE user_id = ? AND book_id = ? AND status IN ({})
            )
            AND NOT EXISTS (
                SELECT 1 FROM books WHERE user_id = ? AND book_id = ?
            )
            "#,
            status_list(&Status::ACTIVE)
        );

        // The holder can finish or be deleted between a rejected insert and the lookup
        for _ in 0..3 {
            let now = chrono::Utc::now().timestamp();
            let inserted = sqlx::query(&sql)
                .bind(user_id)
                .bind(book_id)
                .bind(title)
                .bind(Status::Queued.to_i32())
                .bind(now)
                .bind(now)
                .bind(user_id)
                .bind(book_id)
                .bind(user_id)
                .bind(book_id)
                .execute(&self.pool)
                .await;

            match inserted {
                Ok(result) if result.rows_affected() == 1 => {
                    return Ok(JobId(result.last_insert_rowid()));
                }
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {}
                Err(e) => {
                    return Err(Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to insert job: {}",
                        e
                    ))));
                }
            }

            if let Some(existing) = self.find_active_job(user_id, book_id).await? {
                return Err(Error::DuplicateActiveJob {
                    book_id: book_id.to_string(),
                    existing,
                });
            }
            if self.book_exists(user_id, book_id).await? {
                return Err(Error::AlreadyInLibrary {
                    book_id: book_id.to_string(),
                });
            }
        }

        Err(Error::Database(DatabaseError::ConstraintViolation(format!(
            "could not create job for book {}: active job kept changing",
            book_id
        ))))
    }

    async fn active_job_id(
        conn: &mut sqlx::SqliteConnection,
        user_id: UserId,
        book_id: &str,
    ) -> Result<Option<JobId>> {
        let sql = format!(
            "SELECT id FROM jobs WHERE user_id = ? AND book_id = ? AND status IN ({})",
            status_list(&Status::ACTIVE)
        );
        sqlx::query_scalar::<_, JobId>(&sql)
            .bind(user_id)
            .bind(book_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to look up active job: {}",
                    e
                )))
            })
    }

    /// Find the non-terminal job for (user, book), if any
    pub async fn find_active_job(&self, user_id: UserId, book_id: &str) -> Result<Option<JobId>> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;
        Self::active_job_id(&mut *conn, user_id, book_id).await
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
        sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get job: {}",
                    e
                )))
            })
    }

    /// List a user's jobs in creation order
    pub async fn list_jobs(&self, user_id: UserId) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE user_id = ? ORDER BY id ASC",
            JOB_COLUMNS
        );
        sqlx::query_as::<_, Job>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list jobs: {}",
                    e
                )))
            })
    }

    /// List all jobs with a specific status, oldest first
    pub async fn list_jobs_by_status(&self, status: Status) -> Result<Vec<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE status = ? ORDER BY id ASC",
            JOB_COLUMNS
        );
        sqlx::query_as::<_, Job>(&sql)
            .bind(status.to_i32())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list jobs by status: {}",
                    e
                )))
            })
    }

    /// Apply a status/progress write atomically.
    ///
    /// One guarded `UPDATE` accepts the write only if the transition table allows
    /// it and, for non-terminal statuses, progress does not go backwards.
    /// `completed` pins progress to 100 and `failed` freezes it. A rejected write
    /// is diagnosed into [`JobError`].
    pub async fn update_job(&self, id: JobId, update: &JobUpdate) -> Result<()> {
        let progress: Option<i64> = match update.status {
            Status::Completed => Some(100),
            Status::Failed => None,
            _ => update.progress.map(i64::from),
        };

        let sql = format!(
            r#"
            UPDATE jobs
            SET status = ?,
                progress = COALESCE(?, progress),
                error_message = COALESCE(?, error_message),
                updated_at = ?
            WHERE id = ?
              AND status IN ({})
              AND (? IS NULL OR ? >= progress)
            "#,
            status_list(&Status::predecessors(update.status))
        );

        let result = sqlx::query(&sql)
            .bind(update.status.to_i32())
            .bind(progress)
            .bind(update.error.as_deref())
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .bind(progress)
            .bind(progress)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update job: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        Err(self.diagnose_rejected_update(id, update).await)
    }

    async fn diagnose_rejected_update(&self, id: JobId, update: &JobUpdate) -> Error {
        let current = match self.get_job(id).await {
            Ok(Some(job)) => job,
            Ok(None) => return Error::Job(JobError::NotFound { id }),
            Err(e) => return e,
        };

        let from = current.status();
        if !from.can_transition_to(update.status) {
            return Error::Job(JobError::InvalidTransition {
                id,
                from,
                to: update.status,
            });
        }

        Error::Job(JobError::ProgressRegression {
            id,
            current: current.progress(),
            requested: update.progress.unwrap_or(0),
        })
    }

    /// Delete a job record
    ///
    /// Returns true if a record was removed.
    pub async fn delete_job(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete job: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Fail every job a previous process left mid-flight.
    ///
    /// Running jobs (`downloading`, `converting`, `zipping`) always fail with
    /// [`INTERRUPTED_BY_RESTART`]; `queued` jobs fail too unless `keep_queued`.
    /// Returns the ids that were failed.
    pub async fn fail_interrupted_jobs(&self, keep_queued: bool) -> Result<Vec<JobId>> {
        let statuses: &[Status] = if keep_queued {
            &Status::RUNNING
        } else {
            &Status::ACTIVE
        };

        let sql = format!(
            r#"
            UPDATE jobs
            SET status = ?, error_message = ?, updated_at = ?
            WHERE status IN ({})
            RETURNING id
            "#,
            status_list(statuses)
        );

        let mut ids: Vec<JobId> = sqlx::query_scalar(&sql)
            .bind(Status::Failed.to_i32())
            .bind(INTERRUPTED_BY_RESTART)
            .bind(chrono::Utc::now().timestamp())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to fail interrupted jobs: {}",
                    e
                )))
            })?;

        ids.sort();
        Ok(ids)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
