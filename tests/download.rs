use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tempfile::TempDir;
use tokio::net::TcpListener;

use course_video_fetcher::{Credential, DownloadError, HttpDownloader, VideoFetcher};

const VIDEO_SIZE: usize = 256 * 1024;

fn video_body() -> Vec<u8> {
    (0..VIDEO_SIZE).map(|i| (i % 251) as u8).collect()
}

async fn serve_video() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "video/mp4")],
        video_body(),
    )
}

async fn echo_cookie(headers: HeaderMap) -> impl IntoResponse {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    (StatusCode::OK, cookie)
}

async fn start_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/video.mp4", get(serve_video))
        .route("/cookie", get(echo_cookie))
        .route("/missing.mp4", get(|| async { StatusCode::NOT_FOUND }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, handle)
}

fn downloader() -> HttpDownloader {
    HttpDownloader::new(Duration::from_secs(30), "course-video-fetcher-test").unwrap()
}

#[tokio::test]
async fn test_download_writes_body() {
    let (addr, _handle) = start_server().await;
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("lesson.mp4");

    let written = downloader()
        .fetch(&format!("http://{}/video.mp4", addr), &destination, &[])
        .await
        .unwrap();

    assert_eq!(written, VIDEO_SIZE as u64);
    let saved = std::fs::read(&destination).unwrap();
    assert_eq!(saved, video_body());
}

#[tokio::test]
async fn test_download_sends_cookies() {
    let (addr, _handle) = start_server().await;
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("cookie.txt");
    let credentials = vec![Credential::new("sid", "abc"), Credential::new("uid", "42")];

    downloader()
        .fetch(&format!("http://{}/cookie", addr), &destination, &credentials)
        .await
        .unwrap();

    let echoed = std::fs::read_to_string(&destination).unwrap();
    assert_eq!(echoed, "sid=abc; uid=42");
}

#[tokio::test]
async fn test_error_status_creates_no_file() {
    let (addr, _handle) = start_server().await;
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("missing.mp4");

    let result = downloader()
        .fetch(&format!("http://{}/missing.mp4", addr), &destination, &[])
        .await;

    match result {
        Err(DownloadError::Status { status }) => assert_eq!(status, 404),
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_unwritable_destination() {
    let (addr, _handle) = start_server().await;
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("no-such-dir").join("lesson.mp4");

    let result = downloader()
        .fetch(&format!("http://{}/video.mp4", addr), &destination, &[])
        .await;

    assert!(matches!(result, Err(DownloadError::CreateFile { .. })));
}

#[tokio::test]
async fn test_unreachable_host() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = TempDir::new().unwrap();
    let result = downloader()
        .fetch(&format!("http://{}/video.mp4", addr), &dir.path().join("x.mp4"), &[])
        .await;

    assert!(matches!(result, Err(DownloadError::Network(_))));
}
