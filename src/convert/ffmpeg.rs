//! ffmpeg / ffprobe backed transcoder

use super::traits::{ProbeInfo, TranscodeRequest, Transcoder, TranscoderCapabilities};
use crate::config::ToolsConfig;
use crate::error::{ConversionError, Error};
use crate::planner::ffmpeg_timestamp;
use crate::provider::Decryption;
use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Characters of stderr kept as a failure reason
const MAX_REASON_CHARS: usize = 500;

/// Transcoder running the external `ffmpeg` (and optionally `ffprobe`) binaries
///
/// ```no_run
/// use audiobook_dl::convert::{FfmpegTranscoder, Transcoder};
/// use std::path::PathBuf;
///
/// // Explicit paths
/// let transcoder = FfmpegTranscoder::new(
///     PathBuf::from("/usr/bin/ffmpeg"),
///     Some(PathBuf::from("/usr/bin/ffprobe")),
///     "libmp3lame",
/// );
///
/// // Or auto-discover from PATH
/// let transcoder = FfmpegTranscoder::from_path("libmp3lame")
///     .expect("ffmpeg not found in PATH");
/// assert!(transcoder.capabilities().can_transcode);
/// ```
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: Option<PathBuf>,
    audio_codec: String,
}

impl FfmpegTranscoder {
    /// Create a transcoder with explicit binary paths
    pub fn new(ffmpeg: PathBuf, ffprobe: Option<PathBuf>, audio_codec: impl Into<String>) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            audio_codec: audio_codec.into(),
        }
    }

    /// Find `ffmpeg` (required) and `ffprobe` (optional) in PATH
    pub fn from_path(audio_codec: impl Into<String>) -> Option<Self> {
        let ffmpeg = which::which("ffmpeg").ok()?;
        let ffprobe = which::which("ffprobe").ok();
        Some(Self::new(ffmpeg, ffprobe, audio_codec))
    }

    /// Resolve binaries from configuration: explicit paths first, then PATH
    /// when `search_path` is enabled
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        let search = |name: &str| {
            if tools.search_path {
                which::which(name).ok()
            } else {
                None
            }
        };

        let ffmpeg = tools.ffmpeg_path.clone().or_else(|| search("ffmpeg"))?;
        let ffprobe = tools.ffprobe_path.clone().or_else(|| search("ffprobe"));
        Some(Self::new(ffmpeg, ffprobe, tools.audio_codec.clone()))
    }

    fn transcode_args(&self, request: &TranscodeRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-nostdin", "-v", "error"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.extend(request.decryption.tool_args().into_iter().map(OsString::from));
        args.push("-i".into());
        args.push(request.input.as_os_str().to_owned());

        args.push("-ss".into());
        args.push(ffmpeg_timestamp(request.start).into());
        if let Some(end) = request.end {
            args.push("-to".into());
            args.push(ffmpeg_timestamp(end).into());
        }

        let tags = &request.tags;
        for arg in [
            "-vn".to_string(),
            "-codec:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            request.bitrate.to_string(),
            "-map_metadata".to_string(),
            "-1".to_string(),
            "-metadata".to_string(),
            format!("title={}", tags.title),
            "-metadata".to_string(),
            format!("artist={}", tags.artist),
            "-metadata".to_string(),
            format!("album={}", tags.album),
            "-metadata".to_string(),
            format!("track={}/{}", tags.track, tags.total),
            "-f".to_string(),
            muxer_for(request.format).to_string(),
            "-y".to_string(),
        ] {
            args.push(arg.into());
        }
        args.push(request.output.as_os_str().to_owned());
        args
    }
}

/// ffmpeg muxer for an output extension (the `.part` suffix hides it from ffmpeg)
fn muxer_for(extension: &str) -> &str {
    match extension {
        "m4a" | "m4b" | "mp4" => "ipod",
        "opus" => "ogg",
        other => other,
    }
}

/// Last lines of stderr, trimmed to a readable failure reason
fn failure_reason(stderr: &[u8], status: std::process::ExitStatus) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return format!("ffmpeg exited with {}", status);
    }

    let mut reason = lines[lines.len().saturating_sub(3)..].join("; ");
    if reason.chars().count() > MAX_REASON_CHARS {
        let skip = reason.chars().count() - MAX_REASON_CHARS;
        reason = reason.chars().skip(skip).collect();
    }
    reason
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Deserialize, Default)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    tags: std::collections::HashMap<String, String>,
}

/// Parse `ffprobe -print_format json -show_format` output
pub(crate) fn parse_probe_output(stdout: &[u8]) -> crate::Result<ProbeInfo> {
    let output: ProbeOutput = serde_json::from_slice(stdout)?;
    let format = output.format;

    let duration = format
        .duration
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64);

    let bitrate = format
        .bit_rate
        .and_then(|b| b.parse::<u64>().ok())
        .map(|b| b / 1000)
        .filter(|kbps| *kbps > 0)
        .map(|kbps| format!("{}k", kbps));

    // ffprobe reports tag keys in the container's own case
    let tag = |key: &str| {
        format
            .tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(ProbeInfo {
        duration,
        bitrate,
        artist: tag("artist"),
        album: tag("album"),
    })
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe(&self, input: &Path, decryption: &Decryption) -> crate::Result<ProbeInfo> {
        let ffprobe = self.ffprobe.as_ref().ok_or_else(|| {
            ConversionError::ToolNotAvailable("ffprobe not found; probing skipped".into())
        })?;

        let output = Command::new(ffprobe)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .args(decryption.tool_args())
            .arg("-i")
            .arg(input)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "ffprobe exited with {}",
                output.status
            )));
        }

        parse_probe_output(&output.stdout)
    }

    async fn transcode(&self, request: &TranscodeRequest<'_>) -> crate::Result<()> {
        let output = Command::new(&self.ffmpeg)
            .args(self.transcode_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute ffmpeg: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ExternalTool(failure_reason(
                &output.stderr,
                output.status,
            )))
        }
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_probe: self.ffprobe.is_some(),
            can_transcode: true,
        }
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::traits::ChapterTags;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn chapter_args_cut_decrypt_and_tag() {
        let transcoder = FfmpegTranscoder::new("ffmpeg".into(), None, "libmp3lame");
        let decryption = Decryption::KeyIv {
            key: "k".into(),
            iv: "v".into(),
        };
        let request = TranscodeRequest {
            input: Path::new("/work/jobs/1/container.aaxc"),
            decryption: &decryption,
            start: Duration::from_millis(15_000),
            end: Some(Duration::from_millis(615_500)),
            output: Path::new("/work/jobs/1/out/002 - Arrival.mp3.part"),
            format: "mp3",
            bitrate: "64k",
            tags: ChapterTags {
                title: "Arrival",
                artist: "A. Writer",
                album: "The Long Road",
                track: 2,
                total: 12,
            },
        };

        let args = strings(transcoder.transcode_args(&request));
        let joined = args.join(" ");

        assert!(joined.starts_with("-nostdin -v error -audible_key k -audible_iv v -i /work/jobs/1/container.aaxc"));
        assert!(joined.contains("-ss 15.000 -to 615.500"));
        assert!(joined.contains("-codec:a libmp3lame -b:a 64k"));
        assert!(joined.contains("-map_metadata -1"));
        assert!(args.contains(&"title=Arrival".to_string()));
        assert!(args.contains(&"artist=A. Writer".to_string()));
        assert!(args.contains(&"track=2/12".to_string()));
        assert!(joined.contains("-f mp3 -y"));
        assert_eq!(args.last().unwrap(), "/work/jobs/1/out/002 - Arrival.mp3.part");
    }

    #[test]
    fn last_chapter_has_no_end_bound() {
        let transcoder = FfmpegTranscoder::new("ffmpeg".into(), None, "aac");
        let decryption = Decryption::ActivationBytes("deadbeef".into());
        let request = TranscodeRequest {
            input: Path::new("c.aax"),
            decryption: &decryption,
            start: Duration::from_secs(60),
            end: None,
            output: Path::new("003 - End.m4a.part"),
            format: "m4a",
            bitrate: "128k",
            tags: ChapterTags {
                title: "End",
                artist: "",
                album: "",
                track: 3,
                total: 3,
            },
        };

        let args = strings(transcoder.transcode_args(&request));
        assert!(!args.contains(&"-to".to_string()));
        assert!(args.windows(2).any(|w| w == ["-activation_bytes", "deadbeef"]));
        assert!(args.windows(2).any(|w| w == ["-f", "ipod"]));
    }

    #[test]
    fn probe_output_is_parsed() {
        let stdout = br#"{
            "format": {
                "duration": "5400.250000",
                "bit_rate": "64021",
                "tags": {"ARTIST": "A. Writer", "album": "The Long Road", "genre": "Audiobook"}
            }
        }"#;

        let info = parse_probe_output(stdout).unwrap();
        assert_eq!(info.duration, Some(Duration::from_secs_f64(5400.25)));
        assert_eq!(info.bitrate.as_deref(), Some("64k"));
        assert_eq!(info.artist.as_deref(), Some("A. Writer"));
        assert_eq!(info.album.as_deref(), Some("The Long Road"));
    }

    #[test]
    fn probe_output_without_format_is_empty() {
        let info = parse_probe_output(b"{}").unwrap();
        assert_eq!(info, ProbeInfo::default());
        assert!(parse_probe_output(b"not json").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn failure_reason_keeps_stderr_tail() {
        let status = std::process::Command::new("false").status().unwrap();
        let stderr = b"line one\n\n[aac] decode error\nInvalid data found when processing input\n";
        let reason = failure_reason(stderr, status);
        assert!(reason.ends_with("Invalid data found when processing input"));
        assert!(reason.contains("decode error"));

        let reason = failure_reason(b"", status);
        assert!(reason.starts_with("ffmpeg exited with"));
    }

    #[test]
    fn from_config_prefers_explicit_paths() {
        let tools = ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            ffprobe_path: None,
            search_path: false,
            ..Default::default()
        };
        let transcoder = FfmpegTranscoder::from_config(&tools).unwrap();
        assert_eq!(transcoder.ffmpeg, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert!(transcoder.ffprobe.is_none());
        assert!(!transcoder.capabilities().can_probe);

        let none = ToolsConfig {
            search_path: false,
            ..Default::default()
        };
        assert!(FfmpegTranscoder::from_config(&none).is_none());
    }
}
