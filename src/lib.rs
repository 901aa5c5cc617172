//! # audiobook-dl
//!
//! Durable job pipeline that turns purchased audiobooks into per-chapter
//! audio files packed in a zip archive.
//!
//! Each submitted book becomes a job that a bounded pool of workers drives
//! through four stages:
//!
//! 1. **Download**: fetch the license and stream the encrypted container
//!    from the content provider
//! 2. **Plan**: derive chapter boundaries from the provider's metadata
//! 3. **Convert**: decrypt and encode each chapter with ffmpeg
//! 4. **Package**: zip the chapter files and register the book in the library
//!
//! Jobs, books and provider sessions live in SQLite, so progress survives a
//! restart and interrupted work is reported instead of lost.
//!
//! ## Quick Start
//!
//! ```no_run
//! use audiobook_dl::{AudiobookDownloader, BookRequest, Config, UserId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = AudiobookDownloader::new(Config::default()).await?;
//!     let _workers = downloader.start_queue_processor();
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             tracing::info!(?event, "job event");
//!         }
//!     });
//!
//!     let user = UserId(1);
//!     downloader
//!         .db
//!         .upsert_session(user, "provider-access-token", None, None)
//!         .await?;
//!     let result = downloader
//!         .enqueue(user, vec![BookRequest::new("B0EXAMPLE1")])
//!         .await?;
//!     tracing::info!(created = ?result.created, "submitted");
//!
//!     audiobook_dl::run_with_shutdown(downloader).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Chapter conversion through an external transcoder
pub mod convert;
/// Database persistence layer
pub mod db;
/// Job orchestration and worker pool (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Zip packaging of finished chapters
pub mod package;
/// Chapter planning
pub mod planner;
/// Content provider access and container download
pub mod provider;
/// Retry logic with exponential backoff
pub mod retry;
/// Provider sessions handed over by the login collaborator
pub mod session;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use downloader::{AudiobookDownloader, Components};
pub use error::{
    ApiError, ConversionError, DatabaseError, Error, ErrorDetail, FailureKind, JobError, Result,
    ToHttpStatus,
};
pub use types::{
    BookInfo, BookRequest, Capabilities, EnqueueResult, Event, JobId, JobInfo, Status, UserId,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method,
/// which cancels running jobs and records a clean shutdown.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use audiobook_dl::{AudiobookDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = AudiobookDownloader::new(config).await?;
///     let _workers = downloader.start_queue_processor();
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: AudiobookDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
