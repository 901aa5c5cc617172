//! Per-chapter conversion of a downloaded container

use super::traits::{ChapterTags, ProbeInfo, TranscodeRequest, Transcoder};
use crate::config::ToolsConfig;
use crate::error::{ConversionError, Error, Result};
use crate::planner::ChapterPlan;
use crate::provider::{Decryption, License};
use crate::utils::{part_path, promote_part};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Receives chapter completions while a book converts
#[async_trait]
pub trait ConversionProgress: Send + Sync {
    /// `completed` of `total` chapters are done
    async fn chapter_done(&self, completed: usize, total: usize);
}

/// A downloaded container plus everything needed to encode it
#[derive(Debug, Clone)]
pub struct SourceAudio {
    /// Encrypted container on disk
    pub path: PathBuf,
    /// Key material
    pub decryption: Decryption,
    /// Bit rate to encode with
    pub bitrate: String,
    /// Author tag
    pub artist: String,
    /// Book title tag
    pub album: String,
    /// Container duration, from probing or the provider's runtime
    pub duration: Option<Duration>,
}

/// Chapter files produced for one book
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    /// Output files in plan order
    pub files: Vec<PathBuf>,
}

/// Drives a [`Transcoder`] through a [`ChapterPlan`], one chapter at a time
#[derive(Clone)]
pub struct ConversionExecutor {
    transcoder: Arc<dyn Transcoder>,
    default_bitrate: String,
    extension: String,
}

impl ConversionExecutor {
    /// Create an executor using the output settings from `tools`
    pub fn new(transcoder: Arc<dyn Transcoder>, tools: &ToolsConfig) -> Self {
        Self {
            transcoder,
            default_bitrate: tools.default_bitrate.clone(),
            extension: tools.output_extension.clone(),
        }
    }

    /// Extension of produced chapter files
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The transcoder in use
    pub fn transcoder(&self) -> &Arc<dyn Transcoder> {
        &self.transcoder
    }

    /// Probe the container and fill gaps from the license.
    ///
    /// Probing is best effort: a failure is logged and the configured default
    /// bit rate and the provider's metadata are used instead.
    pub async fn inspect(&self, container: &Path, license: &License) -> SourceAudio {
        let probe = match self.transcoder.probe(container, &license.decryption).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(
                    book_id = %license.book_id,
                    error = %e,
                    "probing container failed, using defaults"
                );
                ProbeInfo::default()
            }
        };

        let author = license.author_line();
        SourceAudio {
            path: container.to_path_buf(),
            decryption: license.decryption.clone(),
            bitrate: probe.bitrate.unwrap_or_else(|| self.default_bitrate.clone()),
            artist: probe
                .artist
                .or_else(|| (!author.is_empty()).then_some(author))
                .unwrap_or_default(),
            album: probe.album.unwrap_or_else(|| license.title.clone()),
            duration: probe.duration.or(license.runtime),
        }
    }

    /// Convert every plan entry into `output_dir`, sequentially.
    ///
    /// Cancellation is checked before each chapter; a chapter that started is
    /// always allowed to finish. Each chapter is written to a `.part` file and
    /// renamed once the tool succeeded and produced output. The first failure
    /// stops the run, removes every chapter file produced so far and is
    /// returned as [`ConversionError::ChapterFailed`].
    pub async fn convert(
        &self,
        source: &SourceAudio,
        plan: &ChapterPlan,
        output_dir: &Path,
        cancel: &CancellationToken,
        progress: &dyn ConversionProgress,
    ) -> Result<ConversionOutcome> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| Error::storage(format!("failed to create {}", output_dir.display()), e))?;

        let total = plan.len();
        let mut produced: Vec<PathBuf> = Vec::with_capacity(total);

        for entry in &plan.entries {
            if cancel.is_cancelled() {
                discard(&produced).await;
                return Err(Error::Cancelled);
            }

            let output = output_dir.join(&entry.file_name);
            let partial = part_path(&output);
            let request = TranscodeRequest {
                input: &source.path,
                decryption: &source.decryption,
                start: entry.start,
                end: entry.end,
                output: &partial,
                format: &self.extension,
                bitrate: &source.bitrate,
                tags: ChapterTags {
                    title: &entry.title,
                    artist: &source.artist,
                    album: &source.album,
                    track: entry.index,
                    total,
                },
            };

            let result = match self.transcoder.transcode(&request).await {
                Ok(()) => finish_chapter(&output, &partial).await,
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                discard(&[partial]).await;
                discard(&produced).await;

                // Only tool failures become chapter failures; a missing tool
                // or a disk error keeps its own kind
                let reason = match e {
                    Error::ExternalTool(reason) => reason,
                    e @ Error::Conversion(ConversionError::MissingOutput { .. }) => e.to_string(),
                    e => return Err(e),
                };
                tracing::error!(
                    chapter = entry.index,
                    title = %entry.title,
                    reason = %reason,
                    "chapter conversion failed"
                );
                return Err(ConversionError::ChapterFailed {
                    index: entry.index,
                    title: entry.title.clone(),
                    reason,
                }
                .into());
            }

            tracing::debug!(chapter = entry.index, total, file = %entry.file_name, "chapter converted");
            produced.push(output);
            progress.chapter_done(entry.index, total).await;
        }

        Ok(ConversionOutcome { files: produced })
    }
}

/// Verify the tool wrote something, then give the file its final name
async fn finish_chapter(output: &Path, partial: &Path) -> Result<()> {
    let written = tokio::fs::metadata(partial)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    if written == 0 {
        return Err(ConversionError::MissingOutput {
            path: output.to_path_buf(),
        }
        .into());
    }
    promote_part(output).await
}

async fn discard(files: &[PathBuf]) {
    for file in files {
        match tokio::fs::remove_file(file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %file.display(), error = %e, "failed to remove chapter file"),
        }
    }
}
