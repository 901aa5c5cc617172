//! Queue processor: the worker pool that pulls queued jobs and spawns their pipelines.

use std::time::Duration;

use super::AudiobookDownloader;
use super::job_task::{JobTaskContext, run_job_task};

/// Interval between queue polling attempts when the queue is empty
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl AudiobookDownloader {
    /// Start the queue processor task
    ///
    /// This method spawns a background task that continuously:
    /// 1. Takes the oldest job from the queue
    /// 2. Acquires a worker slot (respects `jobs.max_concurrent_jobs`)
    /// 3. Registers a cancellation token for the job and spawns its pipeline
    /// 4. Repeats until shutdown closes the worker pool
    ///
    /// A worker slot is held until the job completes or fails, so at most
    /// `max_concurrent_jobs` jobs are ever past `queued` and not yet terminal.
    pub fn start_queue_processor(&self) -> tokio::task::JoinHandle<()> {
        let queue = self.queue_state.queue.clone();
        let concurrent_limit = self.queue_state.concurrent_limit.clone();
        let active_jobs = self.queue_state.active_jobs.clone();
        let downloader = self.clone();

        tokio::spawn(async move {
            loop {
                let queued_item = {
                    let mut queue_guard = queue.lock().await;
                    queue_guard.pop()
                };

                let Some(item) = queued_item else {
                    tokio::time::sleep(QUEUE_POLL_INTERVAL).await;
                    continue;
                };

                let permit = match concurrent_limit.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        // Pool closed by shutdown: keep the job for the next start
                        queue.lock().await.push(item);
                        tracing::debug!("Worker pool closed, queue processor stopping");
                        break;
                    }
                };

                let id = item.id;
                let cancel_token = tokio_util::sync::CancellationToken::new();
                {
                    let mut active = active_jobs.lock().await;
                    active.insert(id, cancel_token.clone());
                }

                let ctx = JobTaskContext {
                    id,
                    user_id: item.user_id,
                    cancel_token,
                    downloader: downloader.clone(),
                };

                tokio::spawn(async move {
                    let _permit = permit;
                    run_job_task(ctx).await;
                });
            }
        })
    }
}
