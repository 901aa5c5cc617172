//! Job orchestrator split into focused submodules.
//!
//! The `AudiobookDownloader` struct and its methods are organized by domain:
//! - [`queue`] - Job submission, FIFO queue management, restart recovery
//! - [`control`] - Job and book lookup, deletion with cancellation, archive retrieval
//! - [`lifecycle`] - Shutdown coordination
//! - [`queue_processor`] - Worker pool: pulls queued jobs under the concurrency bound
//! - [`job_task`] - One job's pipeline (download → plan → convert → package)

mod control;
mod job_task;
mod lifecycle;
mod queue;
mod queue_processor;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::convert::{ConversionExecutor, FfmpegTranscoder, Transcoder, UnavailableTranscoder};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::package::Packager;
use crate::provider::{ContentProvider, Downloader, HttpContentProvider};
use crate::session::{DatabaseSessions, SessionProvider};
use crate::types::{JobId, UserId};

/// Queue and running-job state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Jobs waiting for a worker, oldest first
    pub(crate) queue: std::sync::Arc<tokio::sync::Mutex<std::collections::BinaryHeap<QueuedJob>>>,
    /// Worker slots (respects max_concurrent_jobs)
    pub(crate) concurrent_limit: std::sync::Arc<tokio::sync::Semaphore>,
    /// Running jobs and their cancellation tokens
    pub(crate) active_jobs: std::sync::Arc<
        tokio::sync::Mutex<std::collections::HashMap<JobId, tokio_util::sync::CancellationToken>>,
    >,
    /// Whether new jobs are accepted (false once shutdown started)
    pub(crate) accepting_new: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

/// The four pipeline stages plus the session source they run with
#[derive(Clone)]
pub(crate) struct JobPipeline {
    /// Fetches license and container
    pub(crate) fetcher: Downloader,
    /// Splits the container into chapter files
    pub(crate) converter: ConversionExecutor,
    /// Zips chapter files into the book archive
    pub(crate) packager: Packager,
    /// Per-user provider sessions (read-only)
    pub(crate) sessions: std::sync::Arc<dyn SessionProvider>,
}

/// Pluggable collaborators for [`AudiobookDownloader::with_components`]
pub struct Components {
    /// Remote catalog to download from
    pub provider: std::sync::Arc<dyn ContentProvider>,
    /// Decode/transcode tool
    pub transcoder: std::sync::Arc<dyn Transcoder>,
    /// Session source; `None` reads the `sessions` table
    pub sessions: Option<std::sync::Arc<dyn SessionProvider>>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct AudiobookDownloader {
    /// Job, book and session store
    /// Public for integration tests to inspect job records
    pub db: std::sync::Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<crate::types::Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Queue and running-job state
    pub(crate) queue_state: QueueState,
    /// Pipeline stages shared by all workers
    pub(crate) pipeline: JobPipeline,
}

/// A job waiting in the queue
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    pub(crate) user_id: UserId,
}

// BinaryHeap is a max-heap; the lowest (oldest) id must pop first
impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.id.cmp(&self.id)
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl AudiobookDownloader {
    /// Create a new AudiobookDownloader with the production collaborators
    ///
    /// The provider is [`HttpContentProvider`]; the transcoder is ffmpeg when it
    /// is configured or found on PATH, otherwise [`UnavailableTranscoder`], which
    /// fails every job at the conversion stage.
    pub async fn new(config: Config) -> Result<Self> {
        let provider = std::sync::Arc::new(HttpContentProvider::new(&config.provider)?);

        let transcoder: std::sync::Arc<dyn Transcoder> =
            match FfmpegTranscoder::from_config(&config.tools) {
                Some(ffmpeg) => std::sync::Arc::new(ffmpeg),
                None => std::sync::Arc::new(UnavailableTranscoder),
            };

        Self::with_components(
            config,
            Components {
                provider,
                transcoder,
                sessions: None,
            },
        )
        .await
    }

    /// Create a downloader with explicit collaborators
    ///
    /// This initializes all core components:
    /// - Creates the working and library directories
    /// - Opens/creates the SQLite database and runs migrations
    /// - Sets up the event broadcast channel
    /// - Recovers jobs a previous process left behind
    ///
    /// The worker pool does not run until
    /// [`start_queue_processor`](Self::start_queue_processor) is called.
    pub async fn with_components(config: Config, components: Components) -> Result<Self> {
        config.validate()?;

        for (what, dir) in [
            ("work", config.work_dir()),
            ("library", config.library_dir()),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create {} directory '{}': {}", what, dir.display(), e),
                ))
            })?;
        }

        let db = Database::new(&config.persistence.database_path).await?;

        if db.was_unclean_shutdown().await? {
            tracing::warn!("Previous run did not shut down cleanly");
        }
        db.set_clean_start().await?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let db = std::sync::Arc::new(db);
        let sessions = components
            .sessions
            .unwrap_or_else(|| std::sync::Arc::new(DatabaseSessions::new(db.clone())));

        let transcoder_caps = components.transcoder.capabilities();
        tracing::info!(
            provider = components.provider.name(),
            transcoder = components.transcoder.name(),
            can_transcode = transcoder_caps.can_transcode,
            can_probe = transcoder_caps.can_probe,
            "Pipeline initialized"
        );

        let pipeline = JobPipeline {
            fetcher: Downloader::new(
                components.provider,
                config.retry.clone(),
                config.jobs.min_free_space_bytes,
            ),
            converter: ConversionExecutor::new(components.transcoder, &config.tools),
            packager: Packager,
            sessions,
        };

        let queue_state = QueueState {
            queue: std::sync::Arc::new(tokio::sync::Mutex::new(
                std::collections::BinaryHeap::new(),
            )),
            concurrent_limit: std::sync::Arc::new(tokio::sync::Semaphore::new(
                config.jobs.max_concurrent_jobs,
            )),
            active_jobs: std::sync::Arc::new(tokio::sync::Mutex::new(
                std::collections::HashMap::new(),
            )),
            accepting_new: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
        };

        let downloader = Self {
            db,
            event_tx,
            config: std::sync::Arc::new(config),
            queue_state,
            pipeline,
        };

        downloader.restore_queue().await?;

        Ok(downloader)
    }

    /// Subscribe to job events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use audiobook_dl::{AudiobookDownloader, Config, Event};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = AudiobookDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             if let Event::Failed { id, kind, error, .. } = event {
    ///                 tracing::warn!(job_id = id.0, ?kind, %error, "job failed");
    ///             }
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<crate::types::Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// Query which external tools are usable
    pub fn capabilities(&self) -> crate::types::Capabilities {
        let transcoder = self.pipeline.converter.transcoder();
        let caps = transcoder.capabilities();

        crate::types::Capabilities {
            transcoder: transcoder.name().to_string(),
            can_convert: caps.can_transcode,
            can_probe: caps.can_probe,
        }
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: crate::types::Event) {
        self.event_tx.send(event).ok();
    }

    /// Spawn the REST API server in a background task
    ///
    /// The server runs concurrently with job processing and listens on the
    /// configured bind address (default: 127.0.0.1:6790).
    pub fn spawn_api_server(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<Result<()>> {
        let downloader = self.clone();
        let config = self.config.clone();

        tokio::spawn(async move { crate::api::start_api_server(downloader, config).await })
    }
}
