//! Real-time connection seams.
//!
//! A [`Connector`] opens a [`Connection`] against an [`EndpointRef`]. The
//! connection pushes decoded events into an [`EventSink`] and can ask its
//! owner to rebuild it through a [`ReconnectRequester`]. Both live in the
//! [`ConnectionLink`] handed over at open time.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::models::EndpointRef;

// ── Event sink ───────────────────────────────────────────────────────

/// Receiver for named events decoded off the wire.
///
/// `emit` must not block: implementations schedule work and return.
pub trait EventSink: Send + Sync {
    fn emit(&self, name: &str, payload: serde_json::Value);
}

// ── Reconnect signal ─────────────────────────────────────────────────

/// Create a connected requester/receiver pair.
///
/// The channel holds at most one pending request; repeated requests
/// before the receiver drains it collapse into one.
pub fn reconnect_signal() -> (ReconnectRequester, ReconnectReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ReconnectRequester { tx }, ReconnectReceiver { rx })
}

/// Asks the owning session to tear down the connection and open a new one.
#[derive(Debug, Clone)]
pub struct ReconnectRequester {
    tx: mpsc::Sender<()>,
}

impl ReconnectRequester {
    /// Post a reconnect request. Never blocks; duplicate requests coalesce.
    pub fn request(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Owner side of the reconnect signal.
#[derive(Debug)]
pub struct ReconnectReceiver {
    rx: mpsc::Receiver<()>,
}

impl ReconnectReceiver {
    /// Drain any pending requests. Returns `true` if at least one was posted.
    pub fn take(&mut self) -> bool {
        let mut requested = false;
        while self.rx.try_recv().is_ok() {
            requested = true;
        }
        requested
    }
}

/// What a connection gets from its owner when it is opened.
#[derive(Clone)]
pub struct ConnectionLink {
    pub events: Arc<dyn EventSink>,
    pub reconnect: ReconnectRequester,
}

impl std::fmt::Debug for ConnectionLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLink").finish_non_exhaustive()
    }
}

// ── Connection traits ────────────────────────────────────────────────

/// How a single `run_once` pass ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The remote closed the stream or the pass was cancelled.
    Ended,
    /// The remote (or a missed heartbeat) asked for a fresh connection.
    ReconnectRequested,
}

/// One open real-time connection.
pub trait Connection: Send + Sync + 'static {
    /// Receive and process messages until the connection ends, asks to be
    /// reconnected, fails, or `cancel` fires.
    fn run_once(
        &mut self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<RunOutcome, Error>> + Send;

    /// Send one JSON payload over the connection.
    fn send(&mut self, payload: serde_json::Value) -> impl Future<Output = Result<(), Error>> + Send;

    /// Close the connection. `reconnect` hints that a new connection will
    /// follow (the remote may keep the session resumable).
    fn close(&mut self, reconnect: bool) -> impl Future<Output = ()> + Send;

    /// Whether the underlying transport is still usable.
    fn is_open(&self) -> bool;
}

/// Factory for [`Connection`]s.
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection;

    fn open(
        &self,
        endpoint: &EndpointRef,
        link: ConnectionLink,
    ) -> impl Future<Output = Result<Self::Connection, Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_requests_coalesce() {
        let (requester, mut receiver) = reconnect_signal();
        assert!(!receiver.take());

        requester.request();
        requester.request();
        requester.clone().request();
        assert!(receiver.take());
        assert!(!receiver.take());
    }
}
