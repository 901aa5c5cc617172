//! Transcoder used when ffmpeg cannot be found

use super::traits::{ProbeInfo, TranscodeRequest, Transcoder, TranscoderCapabilities};
use crate::error::ConversionError;
use crate::provider::Decryption;
use async_trait::async_trait;
use std::path::Path;

/// Stand-in transcoder when no ffmpeg binary is configured or on PATH
///
/// The pipeline keeps accepting jobs; each one fails at the conversion stage
/// with [`ConversionError::ToolNotAvailable`] instead of the process refusing
/// to start.
pub struct UnavailableTranscoder;

const HINT: &str = "conversion requires ffmpeg. \
                    Configure tools.ffmpeg_path or ensure ffmpeg is in PATH.";

#[async_trait]
impl Transcoder for UnavailableTranscoder {
    async fn probe(&self, _input: &Path, _decryption: &Decryption) -> crate::Result<ProbeInfo> {
        Err(ConversionError::ToolNotAvailable(HINT.into()).into())
    }

    async fn transcode(&self, _request: &TranscodeRequest<'_>) -> crate::Result<()> {
        Err(ConversionError::ToolNotAvailable(HINT.into()).into())
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_probe: false,
            can_transcode: false,
        }
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
