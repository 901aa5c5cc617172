use super::fake::ScriptedTranscoder;
use super::*;
use crate::config::ToolsConfig;
use crate::error::{ConversionError, Error};
use crate::planner::{self, RawChapter};
use crate::provider::{ContainerFormat, Decryption, License};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn license(chapters: Vec<RawChapter>) -> License {
    License {
        book_id: "B1".into(),
        title: "The Long Road".into(),
        authors: vec!["A. Writer".into(), "B. Writer".into()],
        runtime: Some(Duration::from_secs(50)),
        download_url: url::Url::parse("https://cdn.example/book.aaxc").unwrap(),
        format: ContainerFormat::Aaxc,
        content_length: None,
        decryption: Decryption::KeyIv {
            key: "k".into(),
            iv: "v".into(),
        },
        chapters,
    }
}

fn five_chapters() -> Vec<RawChapter> {
    (0..5u64)
        .map(|i| RawChapter::new(format!("Part {}", i + 1), i * 10_000, 10_000))
        .collect()
}

#[derive(Default)]
struct Recorder {
    done: Mutex<Vec<(usize, usize)>>,
}

#[async_trait]
impl ConversionProgress for Recorder {
    async fn chapter_done(&self, completed: usize, total: usize) {
        self.done.lock().unwrap().push((completed, total));
    }
}

fn executor(transcoder: Arc<ScriptedTranscoder>) -> ConversionExecutor {
    ConversionExecutor::new(transcoder, &ToolsConfig::default())
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn inspect_falls_back_when_probe_fails() {
    let transcoder = Arc::new(ScriptedTranscoder::new());
    let source = executor(transcoder)
        .inspect(Path::new("/c.aaxc"), &license(vec![]))
        .await;

    assert_eq!(source.bitrate, "128k");
    assert_eq!(source.artist, "A. Writer, B. Writer");
    assert_eq!(source.album, "The Long Road");
    assert_eq!(source.duration, Some(Duration::from_secs(50)));
}

#[tokio::test]
async fn inspect_prefers_probe_results() {
    let transcoder = Arc::new(ScriptedTranscoder {
        probe: Some(ProbeInfo {
            duration: Some(Duration::from_secs(49)),
            bitrate: Some("64k".into()),
            artist: Some("Narrated Writer".into()),
            album: None,
        }),
        ..ScriptedTranscoder::default()
    });
    let source = executor(transcoder)
        .inspect(Path::new("/c.aaxc"), &license(vec![]))
        .await;

    assert_eq!(source.bitrate, "64k");
    assert_eq!(source.artist, "Narrated Writer");
    assert_eq!(source.album, "The Long Road");
    assert_eq!(source.duration, Some(Duration::from_secs(49)));
}

#[tokio::test]
async fn converts_every_chapter_in_order() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder::new());
    let executor = executor(transcoder.clone());
    let license = license(five_chapters());
    let source = executor.inspect(&dir.path().join("c.aaxc"), &license).await;
    let plan = planner::plan(&license.chapters, source.duration, &license.title, "mp3");
    let progress = Recorder::default();
    let out = dir.path().join("out");

    let outcome = executor
        .convert(&source, &plan, &out, &CancellationToken::new(), &progress)
        .await
        .unwrap();

    assert_eq!(outcome.files.len(), 5);
    assert_eq!(
        files_in(&out),
        vec![
            "001 - Part 1.mp3",
            "002 - Part 2.mp3",
            "003 - Part 3.mp3",
            "004 - Part 4.mp3",
            "005 - Part 5.mp3"
        ]
    );
    assert_eq!(
        std::fs::read_to_string(out.join("003 - Part 3.mp3")).unwrap(),
        "Part 3\n"
    );

    let calls = transcoder.calls();
    assert_eq!(calls.len(), 5);
    assert_eq!(calls[1].start, Duration::from_secs(10));
    assert_eq!(calls[1].end, Some(Duration::from_secs(20)));
    assert_eq!(calls[4].end, None);
    assert!(calls.iter().all(|c| c.total == 5 && c.album == "The Long Road"));

    assert_eq!(
        *progress.done.lock().unwrap(),
        vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
    );
}

#[tokio::test]
async fn chapter_failure_removes_earlier_chapters() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder::failing_on(3));
    let executor = executor(transcoder.clone());
    let license = license(five_chapters());
    let source = executor.inspect(&dir.path().join("c.aaxc"), &license).await;
    let plan = planner::plan(&license.chapters, source.duration, &license.title, "mp3");
    let progress = Recorder::default();
    let out = dir.path().join("out");

    let err = executor
        .convert(&source, &plan, &out, &CancellationToken::new(), &progress)
        .await
        .unwrap_err();

    match &err {
        Error::Conversion(ConversionError::ChapterFailed {
            index,
            title,
            reason,
        }) => {
            assert_eq!(*index, 3);
            assert_eq!(title, "Part 3");
            assert!(reason.contains("Invalid data"));
        }
        other => panic!("expected ChapterFailed, got {other:?}"),
    }
    assert!(err.to_string().contains("chapter 3"));

    // Chapters 1-2 and the partial chapter 3 are gone; 4-5 never ran
    assert!(files_in(&out).is_empty(), "left behind: {:?}", files_in(&out));
    assert_eq!(transcoder.calls().len(), 3);
    assert_eq!(progress.done.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_output_fails_the_chapter() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder {
        empty_on: Some(2),
        ..ScriptedTranscoder::default()
    });
    let executor = executor(transcoder);
    let license = license(five_chapters());
    let source = executor.inspect(&dir.path().join("c.aaxc"), &license).await;
    let plan = planner::plan(&license.chapters, source.duration, &license.title, "mp3");
    let out = dir.path().join("out");

    let err = executor
        .convert(&source, &plan, &out, &CancellationToken::new(), &Recorder::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Conversion(ConversionError::ChapterFailed { index: 2, .. })
    ));
    assert!(files_in(&out).is_empty());
}

#[tokio::test]
async fn cancellation_stops_between_chapters() {
    let dir = TempDir::new().unwrap();
    let transcoder = Arc::new(ScriptedTranscoder::with_delay(Duration::from_millis(100)));
    let executor = executor(transcoder.clone());
    let license = license(five_chapters());
    let source = executor.inspect(&dir.path().join("c.aaxc"), &license).await;
    let plan = planner::plan(&license.chapters, source.duration, &license.title, "mp3");
    let out = dir.path().join("out");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let err = executor
        .convert(&source, &plan, &out, &cancel, &Recorder::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    // The chapter in flight when the token fired was finished, not cut off
    assert_eq!(transcoder.calls().len(), 2);
    assert!(files_in(&out).is_empty());
}

#[tokio::test]
async fn missing_tool_keeps_its_error_kind() {
    let dir = TempDir::new().unwrap();
    let executor = ConversionExecutor::new(Arc::new(UnavailableTranscoder), &ToolsConfig::default());
    let license = license(five_chapters());
    let source = executor.inspect(&dir.path().join("c.aaxc"), &license).await;
    let plan = planner::plan(&license.chapters, source.duration, &license.title, "mp3");

    let err = executor
        .convert(
            &source,
            &plan,
            &dir.path().join("out"),
            &CancellationToken::new(),
            &Recorder::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Conversion(ConversionError::ToolNotAvailable(_))
    ));
}
