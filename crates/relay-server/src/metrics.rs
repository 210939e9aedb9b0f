//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Accepted WebSocket connections (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Closed WebSocket connections (counter).
pub const DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Currently registered connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Upgrades refused by the identity resolver (counter, labels: kind).
pub const AUTH_FAILURES_TOTAL: &str = "relay_auth_failures_total";
/// Upgrades refused at the connection limit (counter).
pub const CONNECTIONS_REJECTED_TOTAL: &str = "relay_connections_rejected_total";
/// Inbound frames (counter).
pub const FRAMES_RECEIVED_TOTAL: &str = "relay_frames_received_total";
/// Frames enqueued on a target handle (counter).
pub const FRAMES_DELIVERED_TOTAL: &str = "relay_frames_delivered_total";
/// Frames not delivered (counter, labels: reason).
pub const FRAMES_DROPPED_TOTAL: &str = "relay_frames_dropped_total";
/// Connection lifetime (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "relay_connection_duration_seconds";
