//! Job submission, FIFO queue management and restart recovery.

use crate::error::{Error, Result};
use crate::types::{BookRequest, EnqueueResult, Event, JobId, Status, UserId};

use super::{AudiobookDownloader, QueuedJob};

impl AudiobookDownloader {
    /// Submit books for a user
    ///
    /// Creates one queued job per requested book. Books that already have an
    /// active job are reported in [`EnqueueResult::existing`] with that job's id,
    /// and books already in the user's library in [`EnqueueResult::skipped`];
    /// neither is an error, so re-submitting the same set is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has started
    /// - [`Error::Config`] when a book id is blank (nothing is created)
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use audiobook_dl::*;
    /// # async fn example(downloader: AudiobookDownloader) -> Result<()> {
    /// let result = downloader
    ///     .enqueue(UserId(1), vec![BookRequest::new("B0009NF5QS").with_title("Dune")])
    ///     .await?;
    /// println!("created {:?}, already running {:?}", result.created, result.existing);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn enqueue(&self, user_id: UserId, books: Vec<BookRequest>) -> Result<EnqueueResult> {
        if !self
            .queue_state
            .accepting_new
            .load(std::sync::atomic::Ordering::SeqCst)
        {
            return Err(Error::ShuttingDown);
        }

        if let Some(blank) = books.iter().position(|b| b.book_id.trim().is_empty()) {
            return Err(Error::Config {
                message: format!("book id at position {} is empty", blank),
                key: Some("book_id".to_string()),
            });
        }

        let mut result = EnqueueResult::default();

        for book in books {
            let book_id = book.book_id.trim();
            let title = book.display_title().trim().to_string();
            match self.db.create_job(user_id, book_id, &title).await {
                Ok(id) => {
                    self.add_to_queue(id, user_id).await;
                    tracing::info!(job_id = id.0, user_id = user_id.0, book_id, "Job queued");
                    self.emit_event(Event::Queued {
                        id,
                        user_id,
                        book_id: book_id.to_string(),
                        title,
                    });
                    result.created.push(id);
                }
                Err(Error::DuplicateActiveJob { existing, .. }) => {
                    tracing::debug!(
                        job_id = existing.0,
                        book_id,
                        "Book already has an active job"
                    );
                    if !result.existing.contains(&existing) {
                        result.existing.push(existing);
                    }
                }
                Err(Error::AlreadyInLibrary { .. }) => {
                    tracing::debug!(user_id = user_id.0, book_id, "Book already in library, skipping");
                    if !result.skipped.iter().any(|b| b == book_id) {
                        result.skipped.push(book_id.to_string());
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }

    /// Add a job to the in-memory queue
    pub(crate) async fn add_to_queue(&self, id: JobId, user_id: UserId) {
        let mut queue = self.queue_state.queue.lock().await;
        queue.push(QueuedJob { id, user_id });
    }

    /// Remove a job from the in-memory queue without starting it
    ///
    /// Returns true if the job was waiting in the queue.
    pub(crate) async fn remove_from_queue(&self, id: JobId) -> bool {
        let mut queue = self.queue_state.queue.lock().await;

        let original_len = queue.len();
        let items: Vec<_> = queue.drain().filter(|item| item.id != id).collect();
        let was_removed = items.len() < original_len;
        *queue = items.into_iter().collect();

        was_removed
    }

    /// Recover jobs a previous process left behind
    ///
    /// Called automatically during initialization. Every job left unfinished
    /// is failed with [`INTERRUPTED_BY_RESTART`](crate::db::INTERRUPTED_BY_RESTART)
    /// and its working directory is removed. With `jobs.resume_queued_on_restart`
    /// set, jobs still `queued` are put back on the queue instead.
    ///
    /// Returns the re-queued job ids, oldest first.
    pub(crate) async fn restore_queue(&self) -> Result<Vec<JobId>> {
        let keep_queued = self.config.jobs.resume_queued_on_restart;

        let failed = self.db.fail_interrupted_jobs(keep_queued).await?;
        for id in &failed {
            tracing::warn!(job_id = id.0, "Job was interrupted by restart, marked failed");
            crate::utils::remove_dir_best_effort(&self.job_dir(*id)).await;
        }

        if !keep_queued {
            return Ok(Vec::new());
        }

        let mut queued = Vec::new();
        for job in self.db.list_jobs_by_status(Status::Queued).await? {
            self.add_to_queue(job.job_id(), job.owner()).await;
            queued.push(job.job_id());
        }

        if !failed.is_empty() || !queued.is_empty() {
            tracing::info!(
                failed = failed.len(),
                requeued = queued.len(),
                "Queue restoration complete"
            );
        }

        Ok(queued)
    }

    /// Working directory owned by job `id` until it finishes
    pub(crate) fn job_dir(&self, id: JobId) -> std::path::PathBuf {
        self.config.work_dir().join("jobs").join(id.to_string())
    }
}
