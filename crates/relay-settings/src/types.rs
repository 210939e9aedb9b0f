//! Settings types. All structs use camelCase keys and fall back to their
//! defaults field by field, so a settings file only lists what it changes.

use relay_core::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network, limits and heartbeat.
    pub server: ServerSettings,
    /// Frame routing.
    pub routing: RoutingSettings,
    /// Where the connection identity comes from.
    pub identity: IdentitySettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be > 0".into(),
            ));
        }
        if s.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be > 0".into(),
            ));
        }
        if s.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be > 0".into(),
            ));
        }
        if s.heartbeat_timeout_ms < s.heartbeat_interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutMs ({}) is shorter than heartbeatIntervalMs ({})",
                s.heartbeat_timeout_ms, s.heartbeat_interval_ms
            )));
        }
        if self.routing.target_field.is_empty() {
            return Err(SettingsError::InvalidValue(
                "routing.targetField must not be empty".into(),
            ));
        }
        match self.identity.source {
            IdentitySource::Header if self.identity.header.is_empty() => Err(
                SettingsError::InvalidValue("identity.header must not be empty".into()),
            ),
            IdentitySource::Query if self.identity.query_param.is_empty() => Err(
                SettingsError::InvalidValue("identity.queryParam must not be empty".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Maximum concurrently registered connections.
    pub max_connections: usize,
    /// Per-connection outbound queue depth, in frames.
    pub send_queue_capacity: usize,
    /// Largest accepted WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Interval between server pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a connection is closed, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// How long shutdown waits for sessions to finish, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_connections: 10_000,
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Frame routing settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingSettings {
    /// Name of the JSON field holding the target identity.
    pub target_field: String,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            target_field: "target_identity".to_string(),
        }
    }
}

/// Which part of the upgrade request carries the identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    /// A header set by an authenticating reverse proxy.
    #[default]
    Header,
    /// A query parameter (development setups).
    Query,
}

impl IdentitySource {
    /// Parse `header` / `query` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "header" => Some(Self::Header),
            "query" => Some(Self::Query),
            _ => None,
        }
    }
}

/// Identity resolution settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentitySettings {
    /// Which resolver to use.
    pub source: IdentitySource,
    /// Header name for [`IdentitySource::Header`].
    pub header: String,
    /// Query parameter name for [`IdentitySource::Query`].
    pub query_param: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            source: IdentitySource::Header,
            header: "x-relay-identity".to_string(),
            query_param: "identity".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (`RUST_LOG` wins when set).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 8000);
        assert_eq!(s.max_connections, 10_000);
        assert_eq!(s.send_queue_capacity, 256);
        assert_eq!(s.max_message_size, 65_536);
        assert_eq!(s.heartbeat_interval_ms, 30_000);
        assert_eq!(s.heartbeat_timeout_ms, 90_000);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert_eq!(json["server"]["sendQueueCapacity"], 256);
        assert_eq!(json["routing"]["targetField"], "target_identity");
        assert_eq!(json["identity"]["source"], "header");
        assert_eq!(json["identity"]["queryParam"], "identity");
        assert_eq!(json["logging"]["format"], "compact");
    }

    #[test]
    fn partial_object_fills_defaults() {
        let settings: RelaySettings =
            serde_json::from_str(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.identity.header, "x-relay-identity");
    }

    #[test]
    fn identity_source_parse() {
        assert_eq!(IdentitySource::parse("Header"), Some(IdentitySource::Header));
        assert_eq!(IdentitySource::parse("query"), Some(IdentitySource::Query));
        assert_eq!(IdentitySource::parse("cookie"), None);
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut settings = RelaySettings::default();
        settings.server.send_queue_capacity = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_timeout_shorter_than_interval() {
        let mut settings = RelaySettings::default();
        settings.server.heartbeat_interval_ms = 10_000;
        settings.server.heartbeat_timeout_ms = 5_000;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("heartbeatTimeoutMs"));
    }

    #[test]
    fn validate_rejects_empty_target_field() {
        let mut settings = RelaySettings::default();
        settings.routing.target_field = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_checks_only_the_active_identity_source() {
        let mut settings = RelaySettings::default();
        settings.identity.query_param = String::new();
        assert!(settings.validate().is_ok());
        settings.identity.source = IdentitySource::Query;
        assert!(settings.validate().is_err());
    }
}
