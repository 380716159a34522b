//! End-to-end flow: PIN page, one-shot download, replay, teardown.

mod common;

use std::time::Duration;

use qrdrop::TransferSession;
use tokio::net::TcpStream;

const PIN: &str = "4821";

async fn started_session(grace: Duration) -> (TransferSession, u16, tempfile::TempDir, Vec<u8>) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("report.pdf");
    let contents = b"%PDF-1.4 exact bytes matter more than being a real pdf".to_vec();
    std::fs::write(&file, &contents).unwrap();

    let session = TransferSession::with_timeouts(Duration::from_secs(60), grace);
    session.start(0, file, PIN.to_string()).await.unwrap();
    let port = session.port().await.unwrap();
    (session, port, dir, contents)
}

#[tokio::test]
async fn pin_page_then_one_shot_download_then_gone() {
    let (session, port, _dir, contents) = started_session(Duration::from_millis(500)).await;

    // Before any submission the form is served, never the file.
    for _ in 0..3 {
        let page = common::http_get(port, "/").await;
        assert_eq!(page.status, 200);
        assert!(page.headers["content-type"].starts_with("text/html"));
        assert!(String::from_utf8_lossy(&page.body).contains("<form"));
    }

    let ok = common::http_get(port, "/?pin=4821").await;
    assert_eq!(ok.status, 200);
    assert_eq!(ok.headers["content-type"], "application/pdf");
    assert_eq!(ok.headers["content-length"], contents.len().to_string());
    assert_eq!(
        ok.headers["content-disposition"],
        "attachment; filename=\"report.pdf\""
    );
    assert_eq!(ok.body, contents);

    // Replay inside the grace window: the serve-once flag already blocks it.
    let replay = common::http_get(port, "/?pin=4821").await;
    assert_eq!(replay.status, 410);

    // After the grace delay the listener is gone.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(!session.is_running().await);
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[tokio::test]
async fn malformed_and_non_get_requests_get_400() {
    let (session, port, _dir, _contents) = started_session(Duration::from_millis(500)).await;

    let post = common::parse_response(
        common::raw_request(port, "POST / HTTP/1.1\r\nHost: x\r\n\r\n").await,
    );
    assert_eq!(post.status, 400);

    let garbage =
        common::parse_response(common::raw_request(port, "not http at all\r\n\r\n").await);
    assert_eq!(garbage.status, 400);

    // Connection-scoped errors never end the session.
    assert!(session.is_running().await);
    session.stop().await;
}

#[tokio::test]
async fn idle_timeout_closes_listener() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, b"x").unwrap();

    let session =
        TransferSession::with_timeouts(Duration::from_millis(300), Duration::from_millis(100));
    session.start(0, file, "1111".to_string()).await.unwrap();
    let port = session.port().await.unwrap();

    // Reachable before the timeout fires.
    let page = common::http_get(port, "/").await;
    assert_eq!(page.status, 200);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(!session.is_running().await);
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}
