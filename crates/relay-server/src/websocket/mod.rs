//! WebSocket connection handles, heartbeat and session lifecycle.

pub mod connection;
pub mod heartbeat;
pub mod session;
