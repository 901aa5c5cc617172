//! Download stage: license lookup and container streaming with retries

use super::{ContentProvider, License, TransferProgress};
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::session::ProviderSession;
use crate::utils::{ensure_free_space, part_path, promote_part};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedBook {
    /// Fully downloaded container inside the job directory
    pub container_path: PathBuf,
    /// Metadata and decryption material for the later stages
    pub license: License,
}

/// Fetches containers for jobs through a [`ContentProvider`]
#[derive(Clone)]
pub struct Downloader {
    provider: Arc<dyn ContentProvider>,
    retry: RetryConfig,
    min_free_space: u64,
}

impl Downloader {
    /// Create a downloader with the given retry policy and free-space reserve
    pub fn new(provider: Arc<dyn ContentProvider>, retry: RetryConfig, min_free_space: u64) -> Self {
        Self {
            provider,
            retry,
            min_free_space,
        }
    }

    /// Name of the underlying provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Fetch license and container for `book_id` into `job_dir`.
    ///
    /// Transient failures are retried per the retry policy; authentication
    /// failures surface on the first attempt. The container only appears under
    /// its final name once it was completely written.
    pub async fn fetch(
        &self,
        session: &ProviderSession,
        book_id: &str,
        job_dir: &Path,
        cancel: &CancellationToken,
        progress: &dyn TransferProgress,
    ) -> Result<FetchedBook> {
        let license = with_retry(&self.retry, cancel, || self.provider.license(session, book_id)).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let license = license?;

        tokio::fs::create_dir_all(job_dir)
            .await
            .map_err(|e| Error::storage(format!("failed to create {}", job_dir.display()), e))?;

        ensure_free_space(
            job_dir,
            license.content_length.unwrap_or(0),
            self.min_free_space,
        )?;

        let container_path = job_dir.join(format!("container.{}", license.format.extension()));
        let partial = part_path(&container_path);

        tracing::info!(
            book_id,
            format = license.format.extension(),
            bytes = ?license.content_length,
            "downloading container"
        );

        let written = with_retry(&self.retry, cancel, || {
            self.provider
                .download_container(session, &license, &partial, cancel, progress)
        })
        .await;

        if let Err(e) = written {
            if let Err(rm) = tokio::fs::remove_file(&partial).await
                && rm.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %partial.display(), error = %rm, "failed to remove partial container");
            }
            return Err(if cancel.is_cancelled() { Error::Cancelled } else { e });
        }

        promote_part(&container_path).await?;

        Ok(FetchedBook {
            container_path,
            license,
        })
    }
}
