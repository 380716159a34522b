//! One-shot PIN policy: wrong PIN voids the session, percent decoding,
//! and the served check-and-set under racing submissions.

mod common;

use std::time::Duration;

use qrdrop::TransferSession;
use tokio::net::TcpStream;

async fn serve_file(pin: &str, grace: Duration) -> (TransferSession, u16, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, b"the file body").unwrap();

    let session = TransferSession::with_timeouts(Duration::from_secs(60), grace);
    session.start(0, file, pin.to_string()).await.unwrap();
    let port = session.port().await.unwrap();
    (session, port, dir)
}

#[tokio::test]
async fn wrong_pin_is_forbidden_and_terminal() {
    let (session, port, _dir) = serve_file("4821", Duration::from_millis(100)).await;

    let denied = common::http_get(port, "/?pin=9999").await;
    assert_eq!(denied.status, 403);

    // One mistyped PIN voids the transfer: once the grace delay has
    // passed, even the correct PIN cannot reach the file.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!session.is_running().await);
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[tokio::test]
async fn percent_encoded_pin_is_decoded_before_comparison() {
    let (_session, port, _dir) = serve_file("12+34", Duration::from_millis(500)).await;

    let ok = common::http_get(port, "/?pin=12%2B34").await;
    assert_eq!(ok.status, 200);
    assert_eq!(ok.body, b"the file body");
}

#[tokio::test]
async fn concurrent_correct_pins_serve_exactly_once() {
    let (_session, port, _dir) = serve_file("4821", Duration::from_millis(500)).await;

    let (a, b) = tokio::join!(
        common::http_get(port, "/?pin=4821"),
        common::http_get(port, "/?pin=4821"),
    );

    let mut statuses = [a.status, b.status];
    statuses.sort_unstable();
    assert_eq!(statuses, [200, 410]);
}
