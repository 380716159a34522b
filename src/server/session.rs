//! Transfer session lifecycle: bind, accept, idle timeout, teardown.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::http;

/// How long the listener stays up with no PIN submission.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a terminal response gets to flush before the session tears down.
pub const GRACE_DELAY: Duration = Duration::from_millis(500);

/// Errors surfaced by [`TransferSession::start`].
#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid port {0}")]
    InvalidPort(u32),
    #[error("port {0} is already in use")]
    PortInUse(u16),
    #[error("failed to bind listener")]
    Bind(#[source] io::Error),
}

/// One ephemeral share: a bound listener serving one file to one client,
/// gated by a single-use PIN.
///
/// Constructed per transfer and owned by the caller; clones share the same
/// session. A session can be reused sequentially: after [`stop`], a fresh
/// [`start`] binds again with new parameters.
///
/// [`start`]: TransferSession::start
/// [`stop`]: TransferSession::stop
#[derive(Clone)]
pub struct TransferSession {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    pub(crate) state: Mutex<SessionState>,
    idle_timeout: Duration,
    grace_delay: Duration,
}

/// Mutable session state. Every transition, including the served
/// check-and-set in the PIN gate, happens under this one lock.
pub(crate) struct SessionState {
    pub(crate) file_path: Option<PathBuf>,
    pub(crate) pin: Option<String>,
    pub(crate) has_served: bool,
    listener: Option<ListenerHandle>,
}

impl SessionState {
    /// Disarm the idle supervisor. Called under the state lock so the
    /// timeout cannot fire between a PIN check and the matching state
    /// change.
    pub(crate) fn cancel_idle_timeout(&self) {
        if let Some(listener) = &self.listener {
            listener.timeout_cancel.cancel();
        }
    }
}

/// Handles owned while the listener is up. Teardown takes the whole struct
/// out of [`SessionState`] exactly once, so concurrent stop triggers
/// (user, idle supervisor, grace-delay task) cannot double-close anything.
struct ListenerHandle {
    port: u16,
    cancel: CancellationToken,
    timeout_cancel: CancellationToken,
    connections: TaskTracker,
}

impl TransferSession {
    pub fn new() -> Self {
        Self::with_timeouts(IDLE_TIMEOUT, GRACE_DELAY)
    }

    /// Session with custom idle/grace durations. Integration tests use
    /// short values; production callers want [`new`](Self::new).
    pub fn with_timeouts(idle_timeout: Duration, grace_delay: Duration) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState {
                    file_path: None,
                    pin: None,
                    has_served: false,
                    listener: None,
                }),
                idle_timeout,
                grace_delay,
            }),
        }
    }

    /// Bind the listener and begin accepting connections.
    ///
    /// `port` must fit in 16 bits; `0` binds an ephemeral port, readable
    /// afterwards via [`port`](Self::port). The bind is awaited before this
    /// returns, so `Ok(())` means the server is reachable and any bind
    /// failure surfaces here, never later. Calling `start` while already
    /// listening is a no-op.
    pub async fn start(
        &self,
        port: u32,
        file_path: PathBuf,
        pin: String,
    ) -> Result<(), StartError> {
        let mut state = self.inner.state.lock().await;
        if state.listener.is_some() {
            tracing::warn!("transfer session already listening, ignoring start");
            return Ok(());
        }

        let port = u16::try_from(port).map_err(|_| StartError::InvalidPort(port))?;
        let listener = bind_reusable(port)?;
        let local_port = listener.local_addr().map_err(StartError::Bind)?.port();

        state.file_path = Some(file_path);
        state.pin = Some(pin);
        state.has_served = false;

        let cancel = CancellationToken::new();
        let timeout_cancel = CancellationToken::new();
        let connections = TaskTracker::new();

        state.listener = Some(ListenerHandle {
            port: local_port,
            cancel: cancel.clone(),
            timeout_cancel: timeout_cancel.clone(),
            connections: connections.clone(),
        });
        drop(state);

        tokio::spawn(accept_loop(
            self.inner.clone(),
            listener,
            cancel,
            connections,
        ));
        tokio::spawn(idle_supervisor(self.inner.clone(), timeout_cancel));

        tracing::info!(port = local_port, "transfer session listening");
        Ok(())
    }

    /// Close the listener and every open connection, cancel the idle
    /// supervisor, and clear the session fields. Idempotent; safe to call
    /// concurrently from any of the shutdown triggers.
    pub async fn stop(&self) {
        shutdown(&self.inner).await;
    }

    /// Port the listener is actually bound to, while listening.
    pub async fn port(&self) -> Option<u16> {
        let state = self.inner.state.lock().await;
        state.listener.as_ref().map(|l| l.port)
    }

    pub async fn is_running(&self) -> bool {
        self.port().await.is_some()
    }
}

impl Default for TransferSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Bind with local address reuse so a stopped session can rebind the same
/// port right away.
fn bind_reusable(port: u16) -> Result<TcpListener, StartError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket = TcpSocket::new_v4().map_err(StartError::Bind)?;
    socket.set_reuseaddr(true).map_err(StartError::Bind)?;

    let map_bind_err = |e: io::Error| {
        if e.kind() == io::ErrorKind::AddrInUse {
            StartError::PortInUse(port)
        } else {
            StartError::Bind(e)
        }
    };

    socket.bind(addr).map_err(map_bind_err)?;
    socket.listen(1024).map_err(map_bind_err)
}

/// Accept loop. Accepting never waits on a slow client: each connection is
/// handed to its own task, tracked so teardown can wait for them.
async fn accept_loop(
    inner: Arc<SessionInner>,
    listener: TcpListener,
    cancel: CancellationToken,
    connections: TaskTracker,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "connection accepted");
                    let inner = inner.clone();
                    let conn_cancel = cancel.clone();
                    connections.spawn(async move {
                        tokio::select! {
                            _ = conn_cancel.cancelled() => {}
                            _ = http::handle_connection(inner, stream) => {}
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                }
            },
        }
    }
    // Dropping the listener closes the socket; further connection attempts
    // are refused.
}

/// Armed once per successful bind. Fires if the idle timeout elapses with
/// no PIN submission; disarmed through [`SessionState::cancel_idle_timeout`].
async fn idle_supervisor(inner: Arc<SessionInner>, timeout_cancel: CancellationToken) {
    tokio::select! {
        _ = timeout_cancel.cancelled() => {}
        _ = tokio::time::sleep(inner.idle_timeout) => {
            tracing::info!("no PIN submitted before idle timeout, shutting down");
            shutdown(&inner).await;
        }
    }
}

/// Tear the session down. The listener handle is taken out of the state
/// under the lock, so however many triggers race here, exactly one performs
/// the close and the rest are no-ops.
pub(crate) async fn shutdown(inner: &Arc<SessionInner>) {
    let handle = {
        let mut state = inner.state.lock().await;
        state.file_path = None;
        state.pin = None;
        state.has_served = false;
        state.listener.take()
    };

    let Some(handle) = handle else { return };

    handle.timeout_cancel.cancel();
    handle.cancel.cancel();
    handle.connections.close();
    handle.connections.wait().await;
    tracing::info!(port = handle.port, "transfer session stopped");
}

/// Every PIN submission is terminal: give the response a moment to flush,
/// then stop.
pub(crate) fn schedule_stop(inner: Arc<SessionInner>) {
    tokio::spawn(async move {
        tokio::time::sleep(inner.grace_delay).await;
        shutdown(&inner).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn out_of_range_port_is_rejected_before_bind() {
        let session = TransferSession::new();
        let err = session
            .start(70_000, PathBuf::from("/tmp/nope.txt"), "1234".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, StartError::InvalidPort(70_000)));
        assert!(!session.is_running().await);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let session = TransferSession::new();
        session.stop().await;
        session.stop().await;
        assert!(!session.is_running().await);
    }
}
