//! Heartbeat liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The connection was closed for another reason.
    Cancelled,
}

/// Number of consecutive silent intervals tolerated before timing out.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Watch a connection's liveness until it times out or is closed.
///
/// At each `interval` tick the alive flag is checked and reset. Once
/// [`max_missed`] consecutive ticks pass without activity the connection is
/// closed and [`HeartbeatResult::TimedOut`] is returned.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    // The first tick completes immediately.
    let _ = check_interval.tick().await;
    let max_missed = max_missed(interval, timeout);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        connection.close();
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = connection.closed() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
