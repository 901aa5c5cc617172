//! Content provider access (the download stage)
//!
//! - [`ContentProvider`] is the seam to the remote catalog: license lookup
//!   and container streaming. [`HttpContentProvider`] talks to the provider's
//!   REST API; tests substitute fakes.
//! - [`Downloader`] drives one fetch for a job: license, disk-space preflight,
//!   streaming into a `.part` file with bounded retries, then promotion to the
//!   final container path.

use crate::error::Result;
use crate::planner::RawChapter;
use crate::session::ProviderSession;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod fetch;
mod http;

pub use fetch::{Downloader, FetchedBook};
pub use http::HttpContentProvider;

/// Container flavour delivered by the provider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Modern container, decrypted with a per-book key and IV
    Aaxc,
    /// Legacy container, decrypted with the account activation bytes
    Aax,
}

impl ContainerFormat {
    /// File extension used for the downloaded container
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Aaxc => "aaxc",
            ContainerFormat::Aax => "aax",
        }
    }
}

/// Key data needed to decode a container
#[derive(Clone, PartialEq, Eq)]
pub enum Decryption {
    /// Per-book key and IV from a license voucher
    KeyIv {
        /// AES key (hex)
        key: String,
        /// AES IV (hex)
        iv: String,
    },
    /// Account activation bytes (hex)
    ActivationBytes(String),
}

impl Decryption {
    /// Input options telling ffmpeg/ffprobe how to decrypt the container
    pub fn tool_args(&self) -> Vec<String> {
        match self {
            Decryption::KeyIv { key, iv } => vec![
                "-audible_key".to_string(),
                key.clone(),
                "-audible_iv".to_string(),
                iv.clone(),
            ],
            Decryption::ActivationBytes(bytes) => {
                vec!["-activation_bytes".to_string(), bytes.clone()]
            }
        }
    }
}

impl std::fmt::Debug for Decryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decryption::KeyIv { .. } => f.write_str("Decryption::KeyIv(<redacted>)"),
            Decryption::ActivationBytes(_) => {
                f.write_str("Decryption::ActivationBytes(<redacted>)")
            }
        }
    }
}

/// Everything the pipeline needs to know about one book before downloading it
#[derive(Clone, Debug)]
pub struct License {
    /// Provider catalog id
    pub book_id: String,
    /// Book title
    pub title: String,
    /// Author names in credit order
    pub authors: Vec<String>,
    /// Total runtime as reported by the provider
    pub runtime: Option<Duration>,
    /// Where to stream the container from
    pub download_url: url::Url,
    /// Container flavour
    pub format: ContainerFormat,
    /// Expected container size in bytes
    pub content_length: Option<u64>,
    /// Decryption material for the conversion stage
    pub decryption: Decryption,
    /// Raw chapter metadata (may be empty)
    pub chapters: Vec<RawChapter>,
}

impl License {
    /// Authors joined for display and tagging
    pub fn author_line(&self) -> String {
        self.authors.join(", ")
    }
}

/// Receives byte counts while a container streams
#[async_trait]
pub trait TransferProgress: Send + Sync {
    /// `bytes` transferred so far out of `total` (when known)
    async fn transferred(&self, bytes: u64, total: Option<u64>);
}

/// Discards transfer progress
pub struct NoProgress;

#[async_trait]
impl TransferProgress for NoProgress {
    async fn transferred(&self, _bytes: u64, _total: Option<u64>) {}
}

/// Remote catalog the pipeline downloads from
///
/// Implementations classify failures: an invalid session is
/// [`Error::Auth`](crate::error::Error::Auth), a transient transfer failure is
/// [`Error::Network`](crate::error::Error::Network). Retrying is the caller's
/// concern.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Short name for logs and capabilities
    fn name(&self) -> &'static str;

    /// Look up metadata, download location and decryption material for a book
    async fn license(&self, session: &ProviderSession, book_id: &str) -> Result<License>;

    /// Stream the container into `dest`, returning the number of bytes written.
    ///
    /// `dest` is truncated first. Cancellation is observed between chunks and
    /// surfaces as [`Error::Cancelled`](crate::error::Error::Cancelled).
    async fn download_container(
        &self,
        session: &ProviderSession,
        license: &License,
        dest: &Path,
        cancel: &CancellationToken,
        progress: &dyn TransferProgress,
    ) -> Result<u64>;
}
