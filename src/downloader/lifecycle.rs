//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;

use super::AudiobookDownloader;

/// How long shutdown waits for cancelled jobs to clean up
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

impl AudiobookDownloader {
    /// Gracefully shut down the downloader
    ///
    /// 1. Stops accepting new jobs
    /// 2. Closes the worker pool so no queued job starts
    /// 3. Cancels every running job (each aborts at its next checkpoint and
    ///    removes its partial output)
    /// 4. Waits up to 30 seconds for running jobs to finish cleaning up
    /// 5. Marks a clean shutdown in the database
    ///
    /// Cancelled jobs are left in their running status; the next start fails
    /// them as interrupted by restart. Queued jobs stay queued.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.queue_state
            .accepting_new
            .store(false, std::sync::atomic::Ordering::SeqCst);
        self.queue_state.concurrent_limit.close();
        tracing::info!("Stopped accepting new jobs");

        self.cancel_all_active().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All running jobs stopped"),
            Err(_) => tracing::warn!("Timeout waiting for running jobs, proceeding with shutdown"),
        }

        if let Err(e) = self.db.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown in database");
        }

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Signal cancellation to every running job
    pub(crate) async fn cancel_all_active(&self) {
        let active = self.queue_state.active_jobs.lock().await;
        tracing::debug!(active_count = active.len(), "Cancelling running jobs");

        for (id, token) in active.iter() {
            tracing::debug!(job_id = id.0, "Signalling cancellation");
            token.cancel();
        }
    }

    /// Wait until no job is registered as running
    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.queue_state.active_jobs.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for running jobs to stop");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Number of jobs a worker is currently running
    pub async fn active_job_count(&self) -> usize {
        self.queue_state.active_jobs.lock().await.len()
    }
}
