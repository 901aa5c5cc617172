//! Mock provider API, a file-writing transcoder and downloader construction

use async_trait::async_trait;
use audiobook_dl::convert::{ProbeInfo, TranscodeRequest, Transcoder, TranscoderCapabilities};
use audiobook_dl::provider::{Decryption, HttpContentProvider};
use audiobook_dl::{AudiobookDownloader, Components, Config, Error, UserId};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// User with a stored session in every downloader built here
pub const USER: UserId = UserId(1);

/// Bytes served as the encrypted container
pub const CONTAINER: &[u8] = &[0x42; 8192];

/// Transcoder that writes each chapter's title and track as its "audio"
pub struct TitleWriter;

#[async_trait]
impl Transcoder for TitleWriter {
    async fn probe(
        &self,
        _input: &Path,
        _decryption: &Decryption,
    ) -> audiobook_dl::Result<ProbeInfo> {
        Err(Error::ExternalTool("probe not supported".into()))
    }

    async fn transcode(&self, request: &TranscodeRequest<'_>) -> audiobook_dl::Result<()> {
        let body = format!(
            "{} [{}/{}]",
            request.tags.title, request.tags.track, request.tags.total
        );
        tokio::fs::write(request.output, body).await?;
        Ok(())
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_probe: false,
            can_transcode: true,
        }
    }

    fn name(&self) -> &'static str {
        "title-writer"
    }
}

/// Mount the library lookup and license endpoints for `book_id`
///
/// The chapter list has a part heading without audio of its own, so the
/// planned book has four chapters.
pub async fn mount_book(server: &MockServer, book_id: &str, title: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/1.0/library/{book_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "item": {
                "title": title,
                "authors": [{"name": "A. Writer"}, {"name": "B. Writer"}],
                "runtime_length_min": 3
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/1.0/content/{book_id}/licenserequest")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content_license": {
                "status_code": "Granted",
                "content_metadata": {
                    "content_url": {"offline_url": format!("{}/cdn/{book_id}.aaxc", server.uri())},
                    "content_reference": {"content_size_in_bytes": CONTAINER.len()},
                    "chapter_info": {
                        "runtime_length_ms": 180_000,
                        "chapters": [
                            {"title": "Opening Credits", "start_offset_ms": 0, "length_ms": 20_000},
                            {"title": "Part One", "start_offset_ms": 20_000, "length_ms": 0, "chapters": [
                                {"title": "Chapter 1", "start_offset_ms": 20_000, "length_ms": 40_000},
                                {"title": "Chapter 2", "start_offset_ms": 60_000, "length_ms": 40_000}
                            ]},
                            {"title": "End Credits", "start_offset_ms": 100_000, "length_ms": 80_000}
                        ]
                    }
                },
                "license_response": {
                    "key": "00112233445566778899aabbccddeeff",
                    "iv": "ffeeddccbbaa99887766554433221100"
                }
            }
        })))
        .mount(server)
        .await;
}

/// Serve the container for `book_id` after `delay`
pub async fn mount_container(server: &MockServer, book_id: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(format!("/cdn/{book_id}.aaxc")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(CONTAINER)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Config rooted in `dir` talking to `server`
pub fn test_config(dir: &Path, server: &MockServer) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("audiobooks.db");
    config.jobs.work_dir = dir.join("work");
    config.jobs.library_dir = dir.join("library");
    config.jobs.max_concurrent_jobs = 2;
    config.jobs.min_free_space_bytes = 0;
    config.provider.api_base_url = server.uri();
    config.provider.request_timeout = Duration::from_secs(10);
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config
}

/// Open a downloader over `config` with the HTTP provider and [`TitleWriter`]
pub async fn open_downloader(config: Config) -> AudiobookDownloader {
    let provider = HttpContentProvider::new(&config.provider).unwrap();
    let downloader = AudiobookDownloader::with_components(
        config,
        Components {
            provider: Arc::new(provider),
            transcoder: Arc::new(TitleWriter),
            sessions: None,
        },
    )
    .await
    .unwrap();

    downloader
        .db
        .upsert_session(USER, "token-abc", None, None)
        .await
        .unwrap();
    downloader
}

/// Fresh temp dir, mock server and downloader
pub async fn setup() -> (AudiobookDownloader, MockServer, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let downloader = open_downloader(test_config(temp_dir.path(), &server)).await;
    (downloader, server, temp_dir)
}
