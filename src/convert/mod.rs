//! Chapter conversion
//!
//! The external decode/transcode tool sits behind the [`Transcoder`] trait:
//!
//! - [`FfmpegTranscoder`]: runs `ffmpeg` per chapter and `ffprobe` for container properties
//! - [`UnavailableTranscoder`]: stand-in when ffmpeg is missing; every job fails
//!   at conversion with a clear error
//!
//! [`ConversionExecutor`] walks a chapter plan through the transcoder one
//! chapter at a time, with cancellation checkpoints between chapters and
//! all-or-nothing output.
//!
//! ## Usage
//!
//! ```no_run
//! use audiobook_dl::config::ToolsConfig;
//! use audiobook_dl::convert::{ConversionExecutor, FfmpegTranscoder, Transcoder, UnavailableTranscoder};
//! use std::sync::Arc;
//!
//! let tools = ToolsConfig::default();
//! let transcoder: Arc<dyn Transcoder> = match FfmpegTranscoder::from_config(&tools) {
//!     Some(ffmpeg) => Arc::new(ffmpeg),
//!     None => Arc::new(UnavailableTranscoder),
//! };
//! let executor = ConversionExecutor::new(transcoder, &tools);
//! assert_eq!(executor.extension(), "mp3");
//! ```

mod executor;
#[cfg(test)]
pub(crate) mod fake;
mod ffmpeg;
mod traits;
mod unavailable;

pub use executor::{ConversionExecutor, ConversionOutcome, ConversionProgress, SourceAudio};
pub use ffmpeg::FfmpegTranscoder;
pub use traits::{ChapterTags, ProbeInfo, TranscodeRequest, Transcoder, TranscoderCapabilities};
pub use unavailable::UnavailableTranscoder;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
