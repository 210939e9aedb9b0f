//! WebSocket client connection handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::Utf8Bytes;
use relay_core::{ConnectionId, DeliveryError, Identity};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// The sendable, closable reference to one live connection.
///
/// Owned by its session through an `Arc`; the registry only keeps a `Weak`.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Identity this connection was accepted as.
    pub identity: Identity,
    /// Send channel to the connection's writer task.
    tx: mpsc::Sender<Utf8Bytes>,
    /// Cancelled to tear the session down.
    close: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    /// Count of frames dropped due to a full queue.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new handle with a fresh [`ConnectionId`].
    pub fn new(identity: Identity, tx: mpsc::Sender<Utf8Bytes>, close: CancellationToken) -> Self {
        Self {
            id: ConnectionId::new(),
            identity,
            tx,
            close,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Enqueue a text frame for the writer task. Never blocks.
    ///
    /// Refused once the handle is closed, since the writer no longer drains
    /// the queue.
    pub fn send(&self, frame: Utf8Bytes) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(DeliveryError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Ask the owning session to close the connection.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether [`close`](Self::close) was called or the server is shutting down.
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves once the connection has been asked to close.
    pub async fn closed(&self) {
        self.close.cancelled().await;
    }

    /// Mark the connection as alive (pong or any inbound message).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the handle was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new("alice@x.com".into(), tx, CancellationToken::new());
        (conn, rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.id.starts_with("conn_"));
        assert_eq!(conn.identity.as_str(), "alice@x.com");
        assert!(conn.is_alive.load(Ordering::Relaxed));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection(8);
        conn.send("hello".into()).unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.as_str(), "hello");
    }

    #[test]
    fn send_to_full_channel_drops_and_counts() {
        let (conn, _rx) = make_connection(1);
        conn.send("msg1".into()).unwrap();
        assert_eq!(conn.send("msg2".into()), Err(DeliveryError::QueueFull));
        assert_eq!(conn.send("msg3".into()), Err(DeliveryError::QueueFull));
        assert_eq!(conn.drop_count(), 2);
    }

    #[test]
    fn send_to_closed_channel() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert_eq!(conn.send("hello".into()), Err(DeliveryError::Closed));
        assert_eq!(conn.drop_count(), 0);
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let (conn, mut rx) = make_connection(8);
        for i in 0..5 {
            conn.send(format!("msg_{i}").into()).unwrap();
        }
        for i in 0..5 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.as_str(), format!("msg_{i}"));
        }
    }

    #[tokio::test]
    async fn close_resolves_closed() {
        let (conn, _rx) = make_connection(8);
        conn.close();
        assert!(conn.is_closed());
        conn.closed().await;
    }

    #[test]
    fn parent_cancel_closes_handle() {
        let parent = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new("bob@x.com".into(), tx, parent.child_token());
        parent.cancel();
        assert!(conn.is_closed());
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection(8);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection(8);
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }

    #[tokio::test]
    async fn send_after_close_is_refused() {
        let (conn, mut rx) = make_connection(8);
        conn.send("before".into()).unwrap();
        conn.close();
        assert_eq!(conn.send("after".into()), Err(DeliveryError::Closed));
        assert_eq!(conn.drop_count(), 0);
        assert_eq!(rx.recv().await.unwrap().as_str(), "before");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ids_are_unique_per_handle() {
        let (a, _ra) = make_connection(1);
        let (b, _rb) = make_connection(1);
        assert_ne!(a.id, b.id);
    }
}
