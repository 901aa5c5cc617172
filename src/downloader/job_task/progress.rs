//! Stage progress reporting.

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;

use crate::convert::ConversionProgress;
use crate::db::JobUpdate;
use crate::error::{Error, JobError};
use crate::provider::TransferProgress;
use crate::types::{Event, Status};

use super::context::JobTaskContext;

/// Writes one stage's progress through the job store.
///
/// Stage-local fractions are mapped into the stage's slice of the 0–100
/// scale. Only whole-percent increases are written, so a chatty transfer does
/// not turn into a database write per chunk and readers never see progress
/// go backwards.
pub(super) struct StageProgress<'a> {
    ctx: &'a JobTaskContext,
    status: Status,
    reported: AtomicU8,
}

impl<'a> StageProgress<'a> {
    pub(super) fn new(ctx: &'a JobTaskContext, status: Status) -> Self {
        Self {
            ctx,
            status,
            reported: AtomicU8::new(status.progress_range().0),
        }
    }

    async fn report(&self, fraction: f64) {
        let progress = self.status.scale_progress(fraction);
        if self.reported.fetch_max(progress, Ordering::SeqCst) >= progress {
            return;
        }

        let id = self.ctx.id;
        match self
            .ctx
            .db()
            .update_job(id, &JobUpdate::progress(self.status, progress))
            .await
        {
            Ok(()) => {
                self.ctx.downloader.emit_event(Event::Progress {
                    id,
                    user_id: self.ctx.user_id,
                    status: self.status,
                    progress,
                });
            }
            // Deleted mid-stage; the cancellation token stops the stage
            Err(Error::Job(JobError::NotFound { .. })) => {}
            Err(e) => {
                tracing::warn!(job_id = id.0, progress, error = %e, "Failed to record progress");
            }
        }
    }
}

#[async_trait]
impl TransferProgress for StageProgress<'_> {
    async fn transferred(&self, bytes: u64, total: Option<u64>) {
        if let Some(total) = total.filter(|t| *t > 0) {
            self.report(bytes as f64 / total as f64).await;
        }
    }
}

#[async_trait]
impl ConversionProgress for StageProgress<'_> {
    async fn chapter_done(&self, completed: usize, total: usize) {
        self.ctx.downloader.emit_event(Event::ChapterConverted {
            id: self.ctx.id,
            user_id: self.ctx.user_id,
            index: completed,
            total,
        });
        if total > 0 {
            self.report(completed as f64 / total as f64).await;
        }
    }
}
