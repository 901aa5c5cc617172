use super::*;
use crate::convert::fake::ScriptedTranscoder;

#[tokio::test]
async fn test_running_jobs_never_exceed_worker_count() {
    let temp_dir = tempfile::tempdir().unwrap();
    let downloader = downloader_in(
        temp_dir.path(),
        Arc::new(FakeProvider::slow(Duration::from_millis(40))),
        Arc::new(ScriptedTranscoder::new()),
        |config| config.jobs.max_concurrent_jobs = 2,
    )
    .await;
    let _processor = downloader.start_queue_processor();

    let books = (1..=5).map(|i| BookRequest::new(format!("B{i}"))).collect();
    let ids = downloader.enqueue(USER, books).await.unwrap().created;

    let mut max_running = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let jobs = downloader.list_jobs(USER).await.unwrap();
        let running = jobs.iter().filter(|j| j.status.is_running()).count();
        max_running = max_running.max(running);
        assert!(downloader.active_job_count().await <= 2);

        if jobs.iter().all(|j| j.status.is_terminal()) {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "jobs did not finish");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(max_running <= 2, "saw {max_running} running jobs");
    assert!(max_running >= 1);
    for id in ids {
        assert_eq!(
            downloader.get_job(USER, id).await.unwrap().status,
            Status::Completed
        );
    }
}

#[tokio::test]
async fn test_jobs_start_in_creation_order() {
    let temp_dir = tempfile::tempdir().unwrap();
    let downloader = downloader_in(
        temp_dir.path(),
        Arc::new(FakeProvider::default()),
        Arc::new(ScriptedTranscoder::new()),
        |config| config.jobs.max_concurrent_jobs = 1,
    )
    .await;
    let mut events = downloader.subscribe();

    let ids = downloader
        .enqueue(
            USER,
            vec![
                BookRequest::new("B1"),
                BookRequest::new("B2"),
                BookRequest::new("B3"),
            ],
        )
        .await
        .unwrap()
        .created;
    let _processor = downloader.start_queue_processor();

    for id in &ids {
        wait_for_terminal(&downloader, *id).await;
    }

    let started: Vec<JobId> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            Event::StageChanged {
                id,
                status: Status::Downloading,
                ..
            } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(started, ids);
}

#[tokio::test]
async fn test_failed_job_does_not_stop_other_jobs() {
    let (downloader, _temp_dir) = create_test_downloader().await;
    let _processor = downloader.start_queue_processor();

    // No session is stored for this user
    let doomed = downloader
        .enqueue(UserId(2), vec![BookRequest::new("B1")])
        .await
        .unwrap()
        .created[0];
    let fine = downloader
        .enqueue(USER, vec![BookRequest::new("B2")])
        .await
        .unwrap()
        .created[0];

    assert_eq!(
        wait_for_terminal(&downloader, fine).await.status,
        Status::Completed
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let doomed = loop {
        let job = downloader.get_job(UserId(2), doomed).await.unwrap();
        if job.status.is_terminal() {
            break job;
        }
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    assert_eq!(doomed.status, Status::Failed);

    // The pool keeps serving new work afterwards
    let later = downloader
        .enqueue(USER, vec![BookRequest::new("B3")])
        .await
        .unwrap()
        .created[0];
    assert_eq!(
        wait_for_terminal(&downloader, later).await.status,
        Status::Completed
    );
}
