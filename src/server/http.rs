//! Per-connection HTTP handling: one bounded read, one response, close.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::mime;
use super::session::{SessionInner, schedule_stop};

/// Single-read request buffer size.
const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Static HTML for the PIN-entry form.
const PIN_PAGE: &str = include_str!("static/pin_entry.html");

/// Handle one accepted connection. Read errors and malformed requests are
/// contained here: they close this connection and never touch session
/// state.
pub(crate) async fn handle_connection(inner: Arc<SessionInner>, mut stream: TcpStream) {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let n = match stream.read(&mut buf).await {
        Ok(0) => {
            tracing::debug!("empty read, closing connection");
            return;
        }
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(error = %e, "read failed, closing connection");
            return;
        }
    };

    let request = String::from_utf8_lossy(&buf[..n]);
    let Some(path) = parse_get_path(&request) else {
        let _ = write_error(&mut stream, "400 Bad Request").await;
        return;
    };

    tracing::debug!(path, "request");

    match pin_from_path(path) {
        Some(submitted) => handle_pin_submission(inner, stream, &submitted).await,
        None => {
            let _ = write_pin_page(&mut stream).await;
        }
    }
}

/// The one-shot PIN gate. The served check-and-set happens under the
/// session lock, so two simultaneous correct submissions can never both
/// receive the file. Whatever the verdict, the submission ends the session
/// after the grace delay.
async fn handle_pin_submission(inner: Arc<SessionInner>, mut stream: TcpStream, submitted: &str) {
    enum Verdict {
        AlreadyServed,
        Match(PathBuf),
        Mismatch,
    }

    let verdict = {
        let mut state = inner.state.lock().await;
        // A submission is being processed; the idle supervisor no longer
        // decides this session's fate.
        state.cancel_idle_timeout();

        if state.has_served {
            Verdict::AlreadyServed
        } else if state.pin.as_deref() == Some(submitted) {
            state.has_served = true;
            match state.file_path.clone() {
                Some(path) => Verdict::Match(path),
                None => Verdict::Mismatch,
            }
        } else {
            Verdict::Mismatch
        }
    };

    match verdict {
        Verdict::AlreadyServed => {
            tracing::info!("file already served, rejecting replay");
            let _ = write_error(&mut stream, "410 Gone").await;
        }
        Verdict::Match(path) => {
            tracing::info!(file = %path.display(), "PIN accepted, serving file");
            if let Err(e) = write_file(&mut stream, &path).await {
                tracing::warn!(error = %e, "failed to stream file");
            }
        }
        Verdict::Mismatch => {
            tracing::info!("wrong PIN submitted");
            let _ = write_error(&mut stream, "403 Forbidden").await;
        }
    }

    schedule_stop(inner);
}

/// Returns the request path iff the first line is a well-formed GET.
fn parse_get_path(request: &str) -> Option<&str> {
    let line = request.split("\r\n").next()?;
    let rest = line.strip_prefix("GET ")?;
    let path = rest.split(' ').next()?;
    (!path.is_empty()).then_some(path)
}

/// Extract the submitted PIN when the query carries a `pin` parameter.
/// The value is everything after the first `=` in the query string,
/// percent-decoded.
fn pin_from_path(path: &str) -> Option<String> {
    let (_, query) = path.split_once('?')?;
    if !query.contains("pin=") {
        return None;
    }
    let (_, value) = query.split_once('=')?;
    Some(percent_decode_str(value).decode_utf8_lossy().into_owned())
}

/// Stream the file as an attachment. Open/metadata failures become a 500 on
/// this connection; the one-shot policy still applies.
async fn write_file(stream: &mut TcpStream, path: &Path) -> io::Result<()> {
    let (mut file, len) = match open_with_len(path).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::warn!(error = %e, file = %path.display(), "file open failed");
            return write_error(stream, "500 Internal Server Error").await;
        }
    };

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    let head = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Content-Disposition: attachment; filename=\"{}\"\r\n\
         Connection: close\r\n\
         \r\n",
        mime::mime_for_path(path),
        len,
        filename,
    );

    stream.write_all(head.as_bytes()).await?;
    tokio::io::copy(&mut file, stream).await?;
    stream.flush().await
}

async fn open_with_len(path: &Path) -> io::Result<(tokio::fs::File, u64)> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    Ok((file, len))
}

async fn write_pin_page(stream: &mut TcpStream) -> io::Result<()> {
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=UTF-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        PIN_PAGE.len(),
        PIN_PAGE,
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}

async fn write_error(stream: &mut TcpStream, status: &str) -> io::Result<()> {
    let body = format!("{status}\n");
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await
}
