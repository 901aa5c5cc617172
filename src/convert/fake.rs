//! Scripted transcoder for pipeline tests

use super::traits::{ProbeInfo, TranscodeRequest, Transcoder, TranscoderCapabilities};
use crate::error::Error;
use crate::provider::Decryption;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// One recorded transcode invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TranscodeCall {
    pub track: usize,
    pub total: usize,
    pub title: String,
    pub start: Duration,
    pub end: Option<Duration>,
    pub bitrate: String,
    pub artist: String,
    pub album: String,
}

/// Writes the chapter title as the "audio" of each chapter file
#[derive(Default)]
pub(crate) struct ScriptedTranscoder {
    /// Track number whose transcode fails
    pub fail_on: Option<usize>,
    /// Track number for which the tool "succeeds" without writing anything
    pub empty_on: Option<usize>,
    /// Time each chapter takes
    pub delay: Duration,
    /// Probe result; `None` makes probing fail
    pub probe: Option<ProbeInfo>,
    pub(crate) calls: Mutex<Vec<TranscodeCall>>,
}

impl ScriptedTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(track: usize) -> Self {
        Self {
            fail_on: Some(track),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<TranscodeCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn probe(&self, _input: &Path, _decryption: &Decryption) -> crate::Result<ProbeInfo> {
        self.probe
            .clone()
            .ok_or_else(|| Error::ExternalTool("ffprobe exited with exit status: 1".into()))
    }

    async fn transcode(&self, request: &TranscodeRequest<'_>) -> crate::Result<()> {
        let tags = &request.tags;
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(TranscodeCall {
                track: tags.track,
                total: tags.total,
                title: tags.title.to_string(),
                start: request.start,
                end: request.end,
                bitrate: request.bitrate.to_string(),
                artist: tags.artist.to_string(),
                album: tags.album.to_string(),
            });
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.fail_on == Some(tags.track) {
            // A real tool leaves a truncated file behind
            tokio::fs::write(request.output, b"garbage").await?;
            return Err(Error::ExternalTool(
                "Invalid data found when processing input".into(),
            ));
        }
        if self.empty_on == Some(tags.track) {
            tokio::fs::write(request.output, b"").await?;
            return Ok(());
        }

        tokio::fs::write(request.output, format!("{}\n", tags.title)).await?;
        Ok(())
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_probe: self.probe.is_some(),
            can_transcode: true,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
