//! # relay-core
//!
//! Foundation types shared by every signal-relay crate:
//!
//! - [`Identity`] and [`ConnectionId`] newtypes
//! - error enums for identity resolution, frame parsing and delivery
//! - [`logging::init_subscriber`] for the global `tracing` subscriber

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;

pub use errors::{AuthError, DeliveryError, FrameError};
pub use ids::{ConnectionId, Identity};
pub use logging::{LogFormat, init_subscriber};
