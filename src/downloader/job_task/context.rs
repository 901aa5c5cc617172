//! Job task context: shared per-job state, stage transitions and failure recording.

use crate::db::{Database, JobUpdate};
use crate::error::{Error, JobError, Result};
use crate::types::{Event, JobId, Status, UserId};

use super::super::AudiobookDownloader;

/// Shared context for a single job task, reducing parameter passing between helpers.
pub(crate) struct JobTaskContext {
    pub(crate) id: JobId,
    pub(crate) user_id: UserId,
    pub(crate) cancel_token: tokio_util::sync::CancellationToken,
    pub(crate) downloader: AudiobookDownloader,
}

impl JobTaskContext {
    pub(super) fn db(&self) -> &Database {
        &self.downloader.db
    }

    /// Fail with [`Error::Cancelled`] once a delete (or shutdown) signalled this job
    pub(super) fn checkpoint(&self) -> Result<()> {
        if self.cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Enter a pipeline stage, moving progress to the start of its range.
    ///
    /// A deleted record surfaces as [`JobError::NotFound`], which the caller
    /// treats as cancellation.
    pub(super) async fn enter_stage(&self, status: Status) -> Result<()> {
        let (start, _) = status.progress_range();
        self.db()
            .update_job(self.id, &JobUpdate::progress(status, start))
            .await?;

        tracing::info!(job_id = self.id.0, status = %status, "Job entered stage");
        self.downloader
            .emit_event(Event::StageChanged {
                id: self.id,
                user_id: self.user_id,
                status,
            });
        Ok(())
    }

    /// Record the failure on the job and emit the failure event.
    pub(super) async fn mark_failed(&self, error: &Error) {
        let kind = error.failure_kind();
        let message = error.to_string();
        tracing::error!(job_id = self.id.0, ?kind, error = %message, "Job failed");

        match self
            .db()
            .update_job(self.id, &JobUpdate::failed(message.clone()))
            .await
        {
            Ok(()) => {
                self.downloader.emit_event(Event::Failed {
                    id: self.id,
                    user_id: self.user_id,
                    kind,
                    error: message,
                });
            }
            Err(Error::Job(JobError::NotFound { .. })) => {
                tracing::debug!(job_id = self.id.0, "Job deleted before its failure was recorded");
            }
            Err(e) => {
                tracing::error!(job_id = self.id.0, error = %e, "Failed to record job failure");
            }
        }
    }

    /// Release this job's registration as running.
    pub(super) async fn remove_from_active(&self) {
        let mut active = self.downloader.queue_state.active_jobs.lock().await;
        active.remove(&self.id);
    }
}
