use super::test_helpers::*;
use super::*;
use crate::db::JobUpdate;
use crate::error::{FailureKind, JobError};
use crate::types::{BookRequest, Event, JobId, Status, UserId};
use std::sync::Arc;
use std::time::Duration;

mod lifecycle;
mod queue_processor;

/// Move a job through the transition table up to `status` without running it
async fn force_status(downloader: &AudiobookDownloader, id: JobId, status: Status) {
    for step in [Status::Downloading, Status::Converting, Status::Zipping] {
        if step.to_i32() > status.to_i32() {
            break;
        }
        downloader
            .db
            .update_job(id, &JobUpdate::status(step))
            .await
            .unwrap();
    }
}

fn zip_entries(path: &std::path::Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn dir_is_empty_or_missing(path: &std::path::Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(e) => e.kind() == std::io::ErrorKind::NotFound,
    }
}
