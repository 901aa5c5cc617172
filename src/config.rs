//! Configuration types for audiobook-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Job pipeline configuration (directories, concurrency, restart policy)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsConfig {
    /// Working directory for in-flight jobs (default: "./work")
    ///
    /// Each job owns `{work_dir}/jobs/{job_id}` until it completes or is cleaned up.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Directory holding packaged archives (default: "./library")
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,

    /// Maximum jobs running at once (default: 1)
    ///
    /// The provider is rate limited and the transcoder is CPU heavy, so keep this low.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_jobs: usize,

    /// Free space that must remain after the container is written (default: 1 GB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space_bytes: u64,

    /// Put jobs that were still `queued` at shutdown back on the queue (default: false)
    ///
    /// By default every unfinished job is failed with the restart error.
    #[serde(default)]
    pub resume_queued_on_restart: bool,

    /// Keep the downloaded container next to the archive after success (default: false)
    #[serde(default)]
    pub keep_container: bool,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            library_dir: default_library_dir(),
            max_concurrent_jobs: default_max_concurrent(),
            min_free_space_bytes: default_min_free_space(),
            resume_queued_on_restart: false,
            keep_container: false,
        }
    }
}

/// Retry configuration for transient network failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 2, so three tries in total)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// External tool configuration (ffmpeg / ffprobe and output format)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to ffprobe executable (auto-detected if None)
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Audio encoder passed to ffmpeg (default: "libmp3lame")
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Bit rate used when probing does not report one (default: "128k")
    #[serde(default = "default_bitrate")]
    pub default_bitrate: String,

    /// Extension of chapter files (default: "mp3")
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            search_path: true,
            audio_codec: default_audio_codec(),
            default_bitrate: default_bitrate(),
            output_extension: default_output_extension(),
        }
    }
}

/// Content provider API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ProviderConfig {
    /// Base URL of the provider API
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Timeout for metadata requests (default: 30 seconds)
    ///
    /// Container streaming is only bounded by `connect_timeout`, since a
    /// multi-hundred-megabyte transfer legitimately runs for minutes.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// TCP connect timeout (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent to the provider
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Database path (default: "./audiobook-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for AudiobookDownloader
///
/// Every section has defaults, so `{}` is a valid configuration:
/// - [`jobs`](JobsConfig) - directories, concurrency, restart policy
/// - [`retry`](RetryConfig) - backoff for container and metadata transfers
/// - [`tools`](ToolsConfig) - ffmpeg / ffprobe and output format
/// - [`provider`](ProviderConfig) - content provider API
/// - [`persistence`](PersistenceConfig) - database location
/// - [`api`](ApiConfig) - REST surface
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Job pipeline settings
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Retry policy for network transfers
    #[serde(default)]
    pub retry: RetryConfig,

    /// External tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Content provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Persistence settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Working directory root
    pub fn work_dir(&self) -> &PathBuf {
        &self.jobs.work_dir
    }

    /// Library directory root
    pub fn library_dir(&self) -> &PathBuf {
        &self.jobs.library_dir
    }

    /// Reject settings that would make the pipeline unusable
    pub fn validate(&self) -> Result<()> {
        if self.jobs.max_concurrent_jobs == 0 {
            return Err(Error::Config {
                message: "max_concurrent_jobs must be at least 1".to_string(),
                key: Some("jobs.max_concurrent_jobs".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 || !self.retry.backoff_multiplier.is_finite() {
            return Err(Error::Config {
                message: format!(
                    "backoff_multiplier must be >= 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.tools.output_extension.is_empty()
            || self
                .tools
                .output_extension
                .contains(|c: char| !c.is_ascii_alphanumeric())
        {
            return Err(Error::Config {
                message: format!(
                    "output_extension must be alphanumeric, got {:?}",
                    self.tools.output_extension
                ),
                key: Some("tools.output_extension".to_string()),
            });
        }
        if url::Url::parse(&self.provider.api_base_url).is_err() {
            return Err(Error::Config {
                message: format!("invalid api_base_url: {}", self.provider.api_base_url),
                key: Some("provider.api_base_url".to_string()),
            });
        }
        Ok(())
    }
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./work")
}

fn default_library_dir() -> PathBuf {
    PathBuf::from("./library")
}

fn default_max_concurrent() -> usize {
    1
}

fn default_min_free_space() -> u64 {
    1024 * 1024 * 1024 // 1 GB
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./audiobook-dl.db")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_audio_codec() -> String {
    "libmp3lame".to_string()
}

fn default_bitrate() -> String {
    "128k".to_string()
}

fn default_output_extension() -> String {
    "mp3".to_string()
}

fn default_api_base_url() -> String {
    "https://api.audible.com".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    format!("audiobook-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
