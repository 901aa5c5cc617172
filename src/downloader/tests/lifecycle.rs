use super::*;
use crate::convert::fake::ScriptedTranscoder;
use crate::db::INTERRUPTED_BY_RESTART;
use crate::error::Error;

#[tokio::test]
async fn test_shutdown_stops_accepting_jobs() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let mut events = downloader.subscribe();

    downloader.shutdown().await.unwrap();

    assert!(matches!(
        downloader
            .enqueue(USER, vec![BookRequest::new("B1")])
            .await
            .unwrap_err(),
        Error::ShuttingDown
    ));
    assert!(!downloader.db.was_unclean_shutdown().await.unwrap());
    assert!(
        drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, Event::Shutdown))
    );
}

#[tokio::test]
async fn test_shutdown_cancels_running_jobs_and_keeps_queued_ones() {
    let temp_dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeProvider::slow(Duration::from_millis(200)));

    let (running, waiting) = {
        let downloader = downloader_in(
            temp_dir.path(),
            provider.clone(),
            Arc::new(ScriptedTranscoder::new()),
            |config| config.jobs.max_concurrent_jobs = 1,
        )
        .await;
        let processor = downloader.start_queue_processor();

        let ids = downloader
            .enqueue(USER, vec![BookRequest::new("B1"), BookRequest::new("B2")])
            .await
            .unwrap()
            .created;
        wait_for_status(&downloader, ids[0], Status::Downloading).await;

        downloader.shutdown().await.unwrap();
        processor.await.unwrap();

        assert_eq!(downloader.active_job_count().await, 0);
        assert!(!downloader.job_dir(ids[0]).exists());
        assert_eq!(
            downloader.get_job(USER, ids[1]).await.unwrap().status,
            Status::Queued
        );
        (ids[0], ids[1])
    };

    let downloader = downloader_in(
        temp_dir.path(),
        provider,
        Arc::new(ScriptedTranscoder::new()),
        |config| config.jobs.resume_queued_on_restart = true,
    )
    .await;

    let job = downloader.get_job(USER, running).await.unwrap();
    assert_eq!(job.status, Status::Failed);
    assert_eq!(job.error.as_deref(), Some(INTERRUPTED_BY_RESTART));

    let queue = downloader.queue_state.queue.lock().await;
    assert_eq!(queue.peek().map(|item| item.id), Some(waiting));
}

#[tokio::test]
async fn test_capabilities_report_transcoder() {
    let (downloader, _temp_dir) = create_test_downloader().await;

    let caps = downloader.capabilities();
    assert_eq!(caps.transcoder, "scripted");
    assert!(caps.can_convert);
    assert!(!caps.can_probe);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config.jobs.max_concurrent_jobs = 0;

    let result = AudiobookDownloader::with_components(
        config,
        Components {
            provider: Arc::new(FakeProvider::default()),
            transcoder: Arc::new(ScriptedTranscoder::new()),
            sessions: None,
        },
    )
    .await;

    assert!(matches!(result, Err(Error::Config { .. })));
}
