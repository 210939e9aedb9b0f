//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.
//!
//! `Connecting` is [`accept`], which runs before the HTTP upgrade so that a
//! refused identity never touches the registry. `Established` and `Closed`
//! are [`run_session`].

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, close_code};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::{AuthError, Identity};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::identity::{ConnectRequest, IdentityResolver};
use crate::metrics::{
    AUTH_FAILURES_TOTAL, CONNECTION_DURATION_SECONDS, CONNECTIONS_ACTIVE, CONNECTIONS_TOTAL,
    DISCONNECTIONS_TOTAL,
};
use crate::registry::Registry;
use crate::relay::{DispatchOutcome, Relay};

/// How long teardown waits for the writer to flush its Close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a session needs from the server.
#[derive(Clone)]
pub struct SessionContext {
    /// Frame router (and through it, the registry).
    pub relay: Relay,
    /// Server shutdown token; each handle's close token is a child of it.
    pub shutdown: CancellationToken,
    /// Outbound queue depth per handle.
    pub send_queue_capacity: usize,
    /// Ping cadence.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before the handle is closed.
    pub heartbeat_timeout: Duration,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent Close or the stream ended.
    ClientClosed,
    /// Reading from the socket failed.
    TransportError,
    /// The handle was closed from the server side.
    ServerClosed,
    /// The client stopped responding to heartbeats.
    HeartbeatTimeout,
    /// The server is shutting down.
    Shutdown,
}

impl SessionEnd {
    /// Short label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::ServerClosed => "server_closed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Resolve the identity of an incoming upgrade request.
pub async fn accept(
    request: &ConnectRequest,
    resolver: &dyn IdentityResolver,
) -> Result<Identity, AuthError> {
    match resolver.resolve(request).await {
        Ok(identity) => Ok(identity),
        Err(e) => {
            counter!(AUTH_FAILURES_TOTAL, "kind" => e.error_kind()).increment(1);
            warn!(error = %e, "connection refused");
            Err(e)
        }
    }
}

/// Keeps the handle registered for as long as the session runs.
struct Registration {
    registry: Arc<Registry>,
    connection: Arc<ClientConnection>,
}

impl Registration {
    fn new(registry: Arc<Registry>, connection: Arc<ClientConnection>) -> Self {
        let _ = registry.register(&connection.identity, &connection);
        gauge!(CONNECTIONS_ACTIVE).increment(1.0);
        Self {
            registry,
            connection,
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _ = self
            .registry
            .unregister(&self.connection.identity, &self.connection.id);
        gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
    }
}

/// Run an established session until the connection closes.
///
/// 1. Creates the handle and registers it under `identity`
/// 2. Spawns the writer (outbound queue + pings) and heartbeat tasks
/// 3. Dispatches inbound text and UTF-8 binary frames through the relay
/// 4. On exit, closes and unregisters the handle, then flushes a Close frame
#[instrument(skip_all, fields(identity = %identity, conn_id = tracing::field::Empty))]
pub async fn run_session<S, R, E>(
    ws_tx: S,
    mut ws_rx: R,
    identity: Identity,
    ctx: SessionContext,
) -> SessionEnd
where
    S: Sink<Message> + Send + Unpin + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (send_tx, send_rx) = mpsc::channel(ctx.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(
        identity,
        send_tx,
        ctx.shutdown.child_token(),
    ));
    let _ = Span::current().record("conn_id", tracing::field::display(&connection.id));

    let registration = Registration::new(ctx.relay.registry().clone(), connection.clone());
    counter!(CONNECTIONS_TOTAL).increment(1);
    info!("client connected");

    let writer = tokio::spawn(run_writer(
        ws_tx,
        send_rx,
        connection.clone(),
        ctx.heartbeat_interval,
    ));
    let heartbeat = tokio::spawn(run_heartbeat(
        connection.clone(),
        ctx.heartbeat_interval,
        ctx.heartbeat_timeout,
    ));

    let end = loop {
        tokio::select! {
            biased;
            () = connection.closed() => {
                break if ctx.shutdown.is_cancelled() {
                    SessionEnd::Shutdown
                } else {
                    SessionEnd::ServerClosed
                };
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    None => break SessionEnd::ClientClosed,
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read failed");
                        break SessionEnd::TransportError;
                    }
                    Some(Ok(msg)) => msg,
                };
                connection.mark_alive();
                let outcome = match msg {
                    Message::Text(text) => ctx.relay.dispatch(text.as_str()),
                    Message::Binary(data) => ctx.relay.dispatch_bytes(&data),
                    Message::Close(_) => break SessionEnd::ClientClosed,
                    Message::Ping(_) | Message::Pong(_) => continue,
                };
                if let DispatchOutcome::Malformed(e) = outcome {
                    warn!(kind = e.error_kind(), error = %e, "dropping malformed frame");
                }
            }
        }
    };

    // Unreachable from here on; the writer may still be flushing to a slow peer.
    connection.close();
    drop(registration);
    counter!(DISCONNECTIONS_TOTAL).increment(1);
    histogram!(CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());

    finish_writer(writer).await;
    let end = match (end, heartbeat.await) {
        (SessionEnd::ServerClosed, Ok(HeartbeatResult::TimedOut)) => SessionEnd::HeartbeatTimeout,
        (end, _) => end,
    };
    info!(
        reason = end.as_str(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
    end
}

/// Drain the outbound queue into the socket and send periodic pings.
///
/// Sends a Close frame once the handle is closed.
async fn run_writer<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<Utf8Bytes>,
    connection: Arc<ClientConnection>,
    ping_interval: Duration,
) where
    S: Sink<Message> + Unpin,
{
    let mut ping = tokio::time::interval(ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = connection.closed() => break,
            msg = send_rx.recv() => {
                let Some(text) = msg else { break };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    connection.close();
                    return;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    connection.close();
                    return;
                }
            }
        }
    }

    let frame = CloseFrame {
        code: close_code::AWAY,
        reason: Utf8Bytes::from_static("connection closed"),
    };
    let _ = ws_tx.send(Message::Close(Some(frame))).await;
    let _ = ws_tx.close().await;
}

async fn finish_writer(mut writer: JoinHandle<()>) {
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        debug!("writer did not finish in time, aborting");
        writer.abort();
    }
}
