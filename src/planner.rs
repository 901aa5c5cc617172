//! Chapter planning
//!
//! Turns the provider's chapter metadata into an ordered list of split points
//! with filesystem-safe, lexically sortable output names. Metadata that is
//! missing or inconsistent never fails a job: the plan degrades to a single
//! entry covering the whole container.

use crate::utils::{sanitize_component, truncate_chars};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest title (in characters) kept in an output file name
const MAX_TITLE_CHARS: usize = 100;

/// Minimum digits in the sequence prefix of output names
const MIN_INDEX_WIDTH: usize = 3;

/// Chapter as delivered by the provider (offsets in milliseconds)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChapter {
    /// Chapter title, if the provider has one
    #[serde(default)]
    pub title: Option<String>,
    /// Offset of the chapter start within the container
    #[serde(default)]
    pub start_offset_ms: u64,
    /// Chapter length
    #[serde(default)]
    pub length_ms: u64,
    /// Nested sub-chapters (parts containing chapters)
    #[serde(default)]
    pub chapters: Vec<RawChapter>,
}

impl RawChapter {
    /// Leaf chapter with a title
    pub fn new(title: impl Into<String>, start_offset_ms: u64, length_ms: u64) -> Self {
        Self {
            title: Some(title.into()),
            start_offset_ms,
            length_ms,
            chapters: Vec::new(),
        }
    }
}

/// One split point of a conversion plan
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterPlanEntry {
    /// 1-based sequence number
    pub index: usize,
    /// Title written into the output file's tags
    pub title: String,
    /// Offset of the chapter start within the container
    pub start: Duration,
    /// Offset of the chapter end; `None` runs to the end of the container
    pub end: Option<Duration>,
    /// Output file name (`{index} - {title}.{ext}`, index zero-padded)
    pub file_name: String,
}

/// Ordered split plan for one job run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChapterPlan {
    /// Entries in playback order
    pub entries: Vec<ChapterPlanEntry>,
    /// True when the metadata was unusable and the whole file is one entry
    pub whole_file: bool,
}

impl ChapterPlan {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a plan has at least the whole-file entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the split plan for a container.
///
/// `total_duration` is the container length when known (probe result or
/// provider runtime). `fallback_title` names the single entry used when the
/// metadata is missing, empty, overlapping, out of order or beyond the end of
/// the container.
pub fn plan(
    chapters: &[RawChapter],
    total_duration: Option<Duration>,
    fallback_title: &str,
    extension: &str,
) -> ChapterPlan {
    let flat = flatten(chapters);

    match split_points(&flat, total_duration) {
        Some(points) if !points.is_empty() => {
            let width = index_width(points.len());
            let entries = points
                .into_iter()
                .enumerate()
                .map(|(i, (title, start, end))| {
                    let index = i + 1;
                    let title = title
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| format!("Chapter {index}"));
                    entry(index, width, title, start, end, extension)
                })
                .collect();
            ChapterPlan {
                entries,
                whole_file: false,
            }
        }
        _ => {
            if !flat.is_empty() {
                tracing::warn!(
                    chapters = flat.len(),
                    "chapter metadata is inconsistent, converting as a single file"
                );
            }
            let title = match fallback_title.trim() {
                "" => "Chapter 1".to_string(),
                t => t.to_string(),
            };
            ChapterPlan {
                entries: vec![entry(
                    1,
                    index_width(1),
                    title,
                    Duration::ZERO,
                    None,
                    extension,
                )],
                whole_file: true,
            }
        }
    }
}

fn entry(
    index: usize,
    width: usize,
    title: String,
    start: Duration,
    end: Option<Duration>,
    extension: &str,
) -> ChapterPlanEntry {
    let safe = sanitize_component(&title)
        .map(|s| truncate_chars(&s, MAX_TITLE_CHARS))
        .unwrap_or_else(|| format!("Chapter {index}"));
    ChapterPlanEntry {
        index,
        file_name: format!("{index:0width$} - {safe}.{extension}"),
        title,
        start,
        end,
    }
}

/// Digits needed so that every index of a `count`-entry plan has the same width
fn index_width(count: usize) -> usize {
    count.to_string().len().max(MIN_INDEX_WIDTH)
}

/// Depth-first flattening; a part heading without audio of its own is dropped
fn flatten(chapters: &[RawChapter]) -> Vec<&RawChapter> {
    let mut out = Vec::new();
    for chapter in chapters {
        if chapter.chapters.is_empty() || chapter.length_ms > 0 {
            out.push(chapter);
        }
        out.extend(flatten(&chapter.chapters));
    }
    out
}

type SplitPoint = (Option<String>, Duration, Option<Duration>);

/// Validated split points, or `None` when the metadata cannot be trusted
fn split_points(chapters: &[&RawChapter], total: Option<Duration>) -> Option<Vec<SplitPoint>> {
    let total_ms = total.map(|d| d.as_millis() as u64);
    let mut points = Vec::with_capacity(chapters.len());
    let mut previous_end = 0u64;

    for chapter in chapters.iter().filter(|c| c.length_ms > 0) {
        let start = chapter.start_offset_ms;
        let end = start.checked_add(chapter.length_ms)?;

        if start < previous_end {
            return None;
        }
        if total_ms.is_some_and(|total| start >= total) {
            return None;
        }

        previous_end = end;
        points.push((
            chapter.title.clone(),
            Duration::from_millis(start),
            Some(Duration::from_millis(end)),
        ));
    }

    // The last chapter runs to the end of the container so rounding in the
    // provider's offsets never truncates the tail.
    if let Some(last) = points.last_mut() {
        last.2 = None;
    }
    Some(points)
}

/// Format an offset the way ffmpeg's `-ss`/`-to` expect (seconds with millis)
pub fn ffmpeg_timestamp(offset: Duration) -> String {
    format!("{}.{:03}", offset.as_secs(), offset.subsec_millis())
}
