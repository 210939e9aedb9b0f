//! Server configuration.

use std::time::Duration;

use relay_settings::RelaySettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrently registered connections.
    pub max_connections: usize,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a connection after this much silence, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Graceful shutdown budget in milliseconds.
    pub shutdown_timeout_ms: u64,
    /// JSON field carrying the target identity.
    pub target_field: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            shutdown_timeout_ms: 10_000,
            target_field: "target_identity".into(),
        }
    }
}

impl ServerConfig {
    /// Take the server-relevant values out of loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        let s = &settings.server;
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            send_queue_capacity: s.send_queue_capacity,
            max_message_size: s.max_message_size,
            heartbeat_interval_ms: s.heartbeat_interval_ms,
            heartbeat_timeout_ms: s.heartbeat_timeout_ms,
            shutdown_timeout_ms: s.shutdown_timeout_ms,
            target_field: settings.routing.target_field.clone(),
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Graceful shutdown budget.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn durations() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn from_settings_copies_values() {
        let mut settings = RelaySettings::default();
        settings.server.port = 9100;
        settings.server.send_queue_capacity = 8;
        settings.routing.target_field = "to".into();

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.send_queue_capacity, 8);
        assert_eq!(cfg.target_field, "to");
        assert_eq!(cfg.max_message_size, settings.server.max_message_size);
    }

    #[test]
    fn deserialize_from_json_string() {
        let json = r#"{"host":"10.0.0.1","port":3000,"max_connections":5,"send_queue_capacity":4,"max_message_size":512,"heartbeat_interval_ms":1000,"heartbeat_timeout_ms":3000,"shutdown_timeout_ms":100,"target_field":"to"}"#;
        let cfg: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.host, "10.0.0.1");
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.target_field, "to");
    }
}
