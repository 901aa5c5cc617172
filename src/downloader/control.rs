//! Job and book control: lookup, deletion with cancellation, archive retrieval.

use crate::error::{Error, JobError, Result};
use crate::session::SessionUpdate;
use crate::types::{BookInfo, Event, JobId, JobInfo, UserId};
use crate::utils::{remove_dir_best_effort, sanitize_component};
use std::path::PathBuf;

use super::AudiobookDownloader;

impl AudiobookDownloader {
    /// Get one of a user's jobs
    ///
    /// Jobs owned by another user are reported as not found.
    pub async fn get_job(&self, user_id: UserId, id: JobId) -> Result<JobInfo> {
        match self.db.get_job(id).await? {
            Some(job) if job.owner() == user_id => Ok(job.into()),
            _ => Err(Error::Job(JobError::NotFound { id })),
        }
    }

    /// List a user's jobs in creation order
    pub async fn list_jobs(&self, user_id: UserId) -> Result<Vec<JobInfo>> {
        let jobs = self.db.list_jobs(user_id).await?;
        Ok(jobs.into_iter().map(JobInfo::from).collect())
    }

    /// Delete a job, cancelling it if a worker is running it
    ///
    /// Works in any status: a queued job is dropped from the queue with no
    /// filesystem side effects, a running job is signalled before its record
    /// disappears and cleans up its own working directory at the next
    /// checkpoint, and a finished job's record is simply removed (a completed
    /// job's book stays in the library).
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotFound`] if the job does not exist or belongs to
    /// another user.
    pub async fn delete_job(&self, user_id: UserId, id: JobId) -> Result<()> {
        self.get_job(user_id, id).await?;

        let was_queued = self.remove_from_queue(id).await;

        let was_running = {
            let active = self.queue_state.active_jobs.lock().await;
            match active.get(&id) {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            }
        };

        if !self.db.delete_job(id).await? {
            return Err(Error::Job(JobError::NotFound { id }));
        }

        tracing::info!(job_id = id.0, was_queued, was_running, "Job deleted");
        self.emit_event(Event::Removed { id, user_id });

        Ok(())
    }

    /// List a user's completed books, oldest first
    pub async fn list_books(&self, user_id: UserId) -> Result<Vec<BookInfo>> {
        let books = self.db.list_books(user_id).await?;
        Ok(books.into_iter().map(BookInfo::from).collect())
    }

    /// Get one of a user's completed books
    pub async fn get_book(&self, user_id: UserId, book_id: &str) -> Result<BookInfo> {
        self.db
            .get_book(user_id, book_id)
            .await?
            .map(BookInfo::from)
            .ok_or_else(|| Error::NotFound(format!("book {}", book_id)))
    }

    /// Path of a completed book's archive
    ///
    /// Fails with [`Error::NotFound`] when the book is not in the user's
    /// library or its archive went missing on disk.
    pub async fn archive_path(&self, user_id: UserId, book_id: &str) -> Result<PathBuf> {
        let book = self.get_book(user_id, book_id).await?;

        match tokio::fs::metadata(&book.archive_path).await {
            Ok(meta) if meta.is_file() => Ok(book.archive_path),
            _ => {
                tracing::warn!(
                    user_id = user_id.0,
                    book_id,
                    path = %book.archive_path.display(),
                    "Archive registered but missing on disk"
                );
                Err(Error::NotFound(format!("archive for book {}", book_id)))
            }
        }
    }

    /// Remove a completed book together with its archive and working files
    pub async fn delete_book(&self, user_id: UserId, book_id: &str) -> Result<()> {
        let book = self
            .db
            .delete_book(user_id, book_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("book {}", book_id)))?;

        let archive = PathBuf::from(&book.archive_path);
        match tokio::fs::remove_file(&archive).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %archive.display(), error = %e, "Failed to remove archive")
            }
        }
        remove_dir_best_effort(&self.book_dir(user_id, book_id)).await;
        remove_dir_best_effort(&self.job_dir(JobId(book.job_id))).await;

        tracing::info!(user_id = user_id.0, book_id, "Book deleted");
        self.emit_event(Event::BookRemoved {
            user_id,
            book_id: book_id.to_string(),
        });

        Ok(())
    }

    /// Store the provider session handed over by the login collaborator
    ///
    /// Replaces any earlier session for the user. Jobs already running keep
    /// the session they started with.
    pub async fn set_session(&self, user_id: UserId, update: &SessionUpdate) -> Result<()> {
        update.validate()?;
        self.db
            .upsert_session(
                user_id,
                &update.access_token,
                update.activation_bytes.as_deref(),
                update.expires_at,
            )
            .await?;
        tracing::info!(user_id = user_id.0, "Provider session updated");
        Ok(())
    }

    /// Library directory holding one book's files
    pub(crate) fn book_dir(&self, user_id: UserId, book_id: &str) -> PathBuf {
        let book = sanitize_component(book_id).unwrap_or_else(|| "book".to_string());
        self.config
            .library_dir()
            .join(user_id.to_string())
            .join(book)
    }
}
