use pixelsync::config::ServerConfig;
use pixelsync::{DiscoveryClient, SyncServer, UploadClient, UploadOutcome, WatchSession};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::runtime::Handle;

fn server_config(temp: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        content_dir: temp.path().join("uploads"),
        max_upload_bytes: 16 * 1024 * 1024,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watched_file_reaches_receiver() {
    let temp = TempDir::new().unwrap();
    let watch_dir = temp.path().join("D");
    std::fs::create_dir(&watch_dir).unwrap();

    let server = SyncServer::bind(&server_config(&temp)).await.unwrap();
    let handle = server.spawn().unwrap();
    let base = handle.url();

    let session = WatchSession::start(
        &watch_dir,
        UploadClient::new(&base).unwrap(),
        Handle::current(),
        Duration::from_millis(100),
    )
    .unwrap();

    let photo: Vec<u8> = (0..1024u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(watch_dir.join("photo.jpg"), &photo).unwrap();

    // Wait for the upload to land
    let http = reqwest::Client::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    let body = loop {
        let body: serde_json::Value = http
            .get(format!("{}/check_new_files/0", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if !body["new_files"].as_array().unwrap().is_empty() || Instant::now() > deadline {
            break body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    };
    assert_eq!(body, serde_json::json!({"new_files": ["photo.jpg"]}));

    let response = http
        .get(format!("{}/download/photo.jpg", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.bytes().await.unwrap().as_ref(), photo.as_slice());

    // The receiving device gets the same bytes
    let receiver = DiscoveryClient::new(&base).unwrap();
    let phone = temp.path().join("phone");
    let fetched = receiver.fetch_new(0.0, &phone).await.unwrap();
    assert_eq!(fetched, vec![phone.join("photo.jpg")]);
    assert_eq!(std::fs::read(phone.join("photo.jpg")).unwrap(), photo);

    tokio::task::spawn_blocking(move || session.stop()).await.unwrap();
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_overwrite_keeps_latest_bytes_and_both_arrivals() {
    let temp = TempDir::new().unwrap();
    let server = SyncServer::bind(&server_config(&temp)).await.unwrap();
    let state = server.state().clone();
    let handle = server.spawn().unwrap();

    let outbox = temp.path().join("outbox");
    std::fs::create_dir(&outbox).unwrap();
    let source = outbox.join("a.txt");
    let uploader = UploadClient::new(&handle.url()).unwrap();

    std::fs::write(&source, b"version one").unwrap();
    assert!(uploader.upload(&source).await.is_success());
    let after_first = state.recency.query(0.0);
    assert_eq!(after_first, vec!["a.txt"]);

    let receiver = DiscoveryClient::new(&handle.url()).unwrap();
    // Anything after "now" excludes the first upload
    let mid = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;

    std::fs::write(&source, b"version two, longer").unwrap();
    assert!(uploader.upload(&source).await.is_success());

    assert_eq!(receiver.check_new_files(0.0).await.unwrap(), vec!["a.txt", "a.txt"]);
    assert_eq!(receiver.check_new_files(mid).await.unwrap(), vec!["a.txt"]);

    let stored = std::fs::read(temp.path().join("uploads").join("a.txt")).unwrap();
    assert_eq!(stored, b"version two, longer");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_upload_is_invisible_to_discovery() {
    let temp = TempDir::new().unwrap();
    let server = SyncServer::bind(&server_config(&temp)).await.unwrap();
    let handle = server.spawn().unwrap();
    let receiver = DiscoveryClient::new(&handle.url()).unwrap();
    let uploader = UploadClient::new(&handle.url()).unwrap();

    let good = temp.path().join("good.txt");
    std::fs::write(&good, b"ok").unwrap();
    assert!(uploader.upload(&good).await.is_success());
    let before = receiver.check_new_files(0.0).await.unwrap();

    // Break storage underneath the running server
    let uploads = temp.path().join("uploads");
    std::fs::remove_dir_all(&uploads).unwrap();
    std::fs::write(&uploads, b"not a directory").unwrap();

    let bad = temp.path().join("bad.txt");
    std::fs::write(&bad, b"never stored").unwrap();
    match uploader.upload(&bad).await {
        UploadOutcome::ServerRejected(msg) => assert!(msg.starts_with("Failed to upload file")),
        other => panic!("expected server rejection, got {:?}", other),
    }

    assert_eq!(receiver.check_new_files(0.0).await.unwrap(), before);

    handle.shutdown().await.unwrap();
}
