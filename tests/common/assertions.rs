//! Waiting on job outcomes and inspecting archives

use audiobook_dl::{AudiobookDownloader, Event, FailureKind, JobId, Status};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;

/// How a job ended
#[derive(Debug)]
pub enum WaitResult {
    /// Job completed
    Completed,
    /// Job failed with this classification and message
    Failed(FailureKind, String),
    /// No terminal event within the timeout
    Timeout,
    /// Event channel closed
    ChannelClosed,
}

/// Wait on `events` for job `id` to complete or fail
///
/// Subscribe before submitting the job so none of its events are missed.
pub async fn wait_for_outcome(
    events: &mut Receiver<Event>,
    id: JobId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Completed { id: event_id, .. }) if event_id == id => {
                    return WaitResult::Completed;
                }
                Ok(Event::Failed {
                    id: event_id,
                    kind,
                    error,
                    ..
                }) if event_id == id => return WaitResult::Failed(kind, error),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Poll until job `id` is in `status`
pub async fn wait_for_status(
    downloader: &AudiobookDownloader,
    id: JobId,
    status: Status,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Ok(job) = downloader.get_job(super::USER, id).await
            && job.status == status
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Entry names and contents of a zip archive, in archive order
pub fn archive_entries(path: &Path) -> Vec<(String, String)> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut content = String::new();
            std::io::Read::read_to_string(&mut entry, &mut content).unwrap();
            (entry.name().to_string(), content)
        })
        .collect()
}

/// Whether `dir` is missing or has no entries
pub fn is_empty_dir(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
