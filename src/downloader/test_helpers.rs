//! Shared test helpers for creating AudiobookDownloader instances in tests.

use crate::config::Config;
use crate::convert::Transcoder;
use crate::convert::fake::ScriptedTranscoder;
use crate::downloader::{AudiobookDownloader, Components};
use crate::error::Error;
use crate::planner::RawChapter;
use crate::provider::{
    ContainerFormat, ContentProvider, Decryption, License, TransferProgress,
};
use crate::session::ProviderSession;
use crate::types::{Event, JobId, JobInfo, Status, UserId};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

/// User that owns a valid session in every test downloader
pub(crate) const USER: UserId = UserId(1);

/// In-memory provider: five 10-second chapters and a small container
/// streamed in four chunks
pub(crate) struct FakeProvider {
    pub chapters: Vec<RawChapter>,
    pub container: Vec<u8>,
    /// Pause before each chunk
    pub chunk_delay: Duration,
    /// Number of container transfers that fail with a network error first
    pub network_failures: AtomicU32,
    /// Reject every session
    pub reject_session: bool,
    pub(crate) transfers: AtomicU32,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            chapters: (0..5u64)
                .map(|i| RawChapter::new(format!("Part {}", i + 1), i * 10_000, 10_000))
                .collect(),
            container: vec![7u8; 4096],
            chunk_delay: Duration::ZERO,
            network_failures: AtomicU32::new(0),
            reject_session: false,
            transfers: AtomicU32::new(0),
        }
    }
}

impl FakeProvider {
    pub(crate) fn slow(chunk_delay: Duration) -> Self {
        Self {
            chunk_delay,
            ..Self::default()
        }
    }

    pub(crate) fn flaky(failures: u32) -> Self {
        Self {
            network_failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }

    /// Container transfers started so far
    pub(crate) fn transfers(&self) -> u32 {
        self.transfers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn license(&self, _session: &ProviderSession, book_id: &str) -> crate::Result<License> {
        if self.reject_session {
            return Err(Error::Auth("token rejected by provider".into()));
        }
        Ok(License {
            book_id: book_id.to_string(),
            title: format!("Book {}", book_id),
            authors: vec!["Test Author".into()],
            runtime: Some(Duration::from_secs(50)),
            download_url: url::Url::parse(&format!("https://cdn.invalid/{}.aaxc", book_id))
                .map_err(|e| Error::Other(e.to_string()))?,
            format: ContainerFormat::Aaxc,
            content_length: Some(self.container.len() as u64),
            decryption: Decryption::KeyIv {
                key: "00112233445566778899aabbccddeeff".into(),
                iv: "ffeeddccbbaa99887766554433221100".into(),
            },
            chapters: self.chapters.clone(),
        })
    }

    async fn download_container(
        &self,
        _session: &ProviderSession,
        _license: &License,
        dest: &Path,
        cancel: &CancellationToken,
        progress: &dyn TransferProgress,
    ) -> crate::Result<u64> {
        self.transfers.fetch_add(1, Ordering::SeqCst);

        let remaining_failures = self.network_failures.load(Ordering::SeqCst);
        if remaining_failures > 0 {
            self.network_failures
                .store(remaining_failures - 1, Ordering::SeqCst);
            return Err(Error::Network("operation timed out".into()));
        }

        let total = self.container.len() as u64;
        let chunk_size = self.container.len().div_ceil(4).max(1);
        let mut content = Vec::with_capacity(self.container.len());

        for chunk in self.container.chunks(chunk_size) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            content.extend_from_slice(chunk);
            tokio::fs::write(dest, &content).await?;
            progress.transferred(content.len() as u64, Some(total)).await;
        }

        Ok(total)
    }
}

/// Test configuration rooted in `dir`: fast retries, two workers
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.jobs.work_dir = dir.join("work");
    config.jobs.library_dir = dir.join("library");
    config.jobs.max_concurrent_jobs = 2;
    config.jobs.min_free_space_bytes = 0;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config
}

/// Build a downloader in `dir` with the given collaborators and a session for [`USER`]
pub(crate) async fn downloader_in(
    dir: &Path,
    provider: Arc<FakeProvider>,
    transcoder: Arc<dyn Transcoder>,
    configure: impl FnOnce(&mut Config),
) -> AudiobookDownloader {
    let mut config = test_config(dir);
    configure(&mut config);

    let downloader = AudiobookDownloader::with_components(
        config,
        Components {
            provider,
            transcoder,
            sessions: None,
        },
    )
    .await
    .unwrap();

    downloader
        .db
        .upsert_session(USER, "test-token", Some("deadbeef"), None)
        .await
        .unwrap();

    downloader
}

/// Helper to create a test downloader with the default fakes.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (AudiobookDownloader, TempDir) {
    let temp_dir = tempdir().unwrap();
    let downloader = downloader_in(
        temp_dir.path(),
        Arc::new(FakeProvider::default()),
        Arc::new(ScriptedTranscoder::new()),
        |_| {},
    )
    .await;
    (downloader, temp_dir)
}

/// Poll until job `id` reaches a terminal status (panics after 10 seconds)
pub(crate) async fn wait_for_terminal(downloader: &AudiobookDownloader, id: JobId) -> JobInfo {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = downloader.get_job(USER, id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} stuck in {}",
            job.status
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until job `id` has reached `status` (or any later one)
pub(crate) async fn wait_for_status(downloader: &AudiobookDownloader, id: JobId, status: Status) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(job) = downloader.db.get_job(id).await.unwrap()
            && (job.status() == status || job.status().is_terminal())
        {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {id} never reached {status}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until no job is registered as running (panics after 10 seconds)
pub(crate) async fn wait_for_idle(downloader: &AudiobookDownloader) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while downloader.active_job_count().await > 0 {
        assert!(tokio::time::Instant::now() < deadline, "workers never went idle");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drain every event currently buffered in `rx`
pub(crate) fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
