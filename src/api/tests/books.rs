use super::*;

/// Run one book to completion through the worker pool
async fn completed_book(app: &Router, downloader: &Arc<AudiobookDownloader>) -> JobId {
    let _processor = downloader.start_queue_processor();
    let id = submit(app, 1, "B1").await;
    let job = wait_for_terminal(downloader, id).await;
    assert_eq!(job.status, crate::types::Status::Completed, "{:?}", job.error);
    id
}

#[tokio::test]
async fn test_list_books_after_completion() {
    let (app, downloader, _temp_dir) = test_app().await;

    let response = send(&app, Method::GET, "/users/1/books", None).await;
    assert_eq!(body_json(response).await, json!([]));

    completed_book(&app, &downloader).await;

    let response = send(&app, Method::GET, "/users/1/books", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let books = body_json(response).await;
    assert_eq!(books.as_array().unwrap().len(), 1);
    assert_eq!(books[0]["book_id"], "B1");
    assert_eq!(books[0]["title"], "Book B1");
    assert_eq!(books[0]["chapter_count"], 5);

    // Other users see nothing
    let response = send(&app, Method::GET, "/users/2/books", None).await;
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn test_archive_download_streams_zip() {
    let (app, downloader, _temp_dir) = test_app().await;
    completed_book(&app, &downloader).await;

    let response = send(&app, Method::GET, "/users/1/books/B1/archive", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"Book B1.zip\""
    );

    let bytes = body_bytes(response).await;
    let on_disk = std::fs::read(downloader.archive_path(USER, "B1").await.unwrap()).unwrap();
    assert_eq!(bytes, on_disk);

    let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 5);
}

#[tokio::test]
async fn test_archive_of_unknown_book_is_not_found() {
    let (app, _downloader, _temp_dir) = test_app().await;

    let response = send(&app, Method::GET, "/users/1/books/B9/archive", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_delete_book() {
    let (app, downloader, _temp_dir) = test_app().await;
    completed_book(&app, &downloader).await;
    let archive = downloader.archive_path(USER, "B1").await.unwrap();

    let response = send(&app, Method::DELETE, "/users/1/books/B1", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!archive.exists());

    let response = send(&app, Method::GET, "/users/1/books/B1/archive", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, Method::DELETE, "/users/1/books/B1", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_put_session() {
    let (app, downloader, _temp_dir) = test_app().await;

    let response = send(
        &app,
        Method::PUT,
        "/users/3/session",
        Some(json!({"access_token": "tok", "activation_bytes": "0a1b2c3d"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let row = downloader
        .db
        .get_session(crate::types::UserId(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.access_token, "tok");

    let response = send(
        &app,
        Method::PUT,
        "/users/3/session",
        Some(json!({"access_token": ""})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
