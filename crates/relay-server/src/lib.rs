//! # relay-server
//!
//! WebSocket signaling relay built on axum.
//!
//! - Identity resolution of upgrade requests (header or query parameter)
//! - Registry of identity → live connection handles
//! - Frame dispatch: route by a JSON field, forward the original text unchanged
//! - Per-connection session with bounded outbound queue, pings and heartbeat timeout
//! - `/health` and `/metrics` endpoints
//! - Graceful shutdown via `CancellationToken` + `TaskTracker`

#![deny(unsafe_code)]

pub mod config;
pub mod frame;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use identity::{
    ConnectRequest, HeaderIdentityResolver, IdentityResolver, QueryIdentityResolver,
    resolver_from_settings,
};
pub use registry::Registry;
pub use relay::{DispatchOutcome, Relay};
pub use server::RelayServer;
pub use websocket::session::SessionEnd;
