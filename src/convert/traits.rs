//! Traits and types for the transcode tool

use crate::provider::Decryption;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// What probing a container revealed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    /// Container duration
    pub duration: Option<Duration>,
    /// Source bit rate in ffmpeg notation (e.g. `"64k"`)
    pub bitrate: Option<String>,
    /// `artist` tag
    pub artist: Option<String>,
    /// `album` tag
    pub album: Option<String>,
}

/// Tags written into one chapter file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterTags<'a> {
    /// Chapter title
    pub title: &'a str,
    /// Book author(s)
    pub artist: &'a str,
    /// Book title
    pub album: &'a str,
    /// 1-based track number
    pub track: usize,
    /// Number of tracks in the book
    pub total: usize,
}

/// One chapter to cut out of the container and encode
#[derive(Debug, Clone)]
pub struct TranscodeRequest<'a> {
    /// Encrypted container
    pub input: &'a Path,
    /// Key material for the container
    pub decryption: &'a Decryption,
    /// Chapter start
    pub start: Duration,
    /// Chapter end; `None` encodes to the end of the container
    pub end: Option<Duration>,
    /// File to write (a `.part` path, so the format is given explicitly)
    pub output: &'a Path,
    /// Output format as a file extension (e.g. `"mp3"`)
    pub format: &'a str,
    /// Target bit rate in ffmpeg notation
    pub bitrate: &'a str,
    /// Metadata for the chapter file
    pub tags: ChapterTags<'a>,
}

/// Capabilities of a transcoder implementation
#[derive(Debug, Clone, Copy)]
pub struct TranscoderCapabilities {
    /// Can read duration, bit rate and tags from a container
    pub can_probe: bool,
    /// Can decrypt and encode chapters
    pub can_transcode: bool,
}

/// Decrypting decoder/encoder driven once per chapter
///
/// Implementations run an external tool; a failed run is reported as
/// [`Error::ExternalTool`](crate::Error::ExternalTool) carrying the tool's
/// reason so the executor can name it in the job's error.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Read container properties
    async fn probe(&self, input: &Path, decryption: &Decryption) -> crate::Result<ProbeInfo>;

    /// Encode one chapter into `request.output`
    async fn transcode(&self, request: &TranscodeRequest<'_>) -> crate::Result<()>;

    /// What this implementation can do
    fn capabilities(&self) -> TranscoderCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
