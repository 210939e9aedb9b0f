//! Error types for identity resolution, frame parsing and delivery.
//!
//! None of these are fatal to the process. Each one is scoped to a single
//! connection (auth, delivery) or a single frame (parse).

use thiserror::Error;

/// Identity resolution failed; the connection never reaches Established.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No identity where the resolver looked (header or query parameter).
    #[error("no identity in {0}")]
    Missing(String),
    /// An identity was present but unusable (empty, not UTF-8).
    #[error("invalid identity: {0}")]
    Invalid(String),
    /// The resolver refused the identity.
    #[error("identity rejected: {0}")]
    Rejected(String),
}

impl AuthError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Missing(_) => "missing",
            Self::Invalid(_) => "invalid",
            Self::Rejected(_) => "rejected",
        }
    }
}

/// An inbound frame could not be routed. The frame is dropped; the sending
/// connection stays open.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not parseable as JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Valid JSON, but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// The routing field is absent.
    #[error("missing routing field `{0}`")]
    MissingTarget(String),
    /// The routing field is present but not a string.
    #[error("routing field `{0}` is not a string")]
    TargetNotString(String),
    /// The routing field is an empty string.
    #[error("routing field `{0}` is empty")]
    EmptyTarget(String),
    /// A binary message that is not valid UTF-8.
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

impl FrameError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingTarget(_) => "missing_target",
            Self::TargetNotString(_) => "target_not_string",
            Self::EmptyTarget(_) => "empty_target",
            Self::NotUtf8 => "not_utf8",
        }
    }
}

/// Enqueueing a frame on one connection handle failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The handle's outbound queue is full (slow consumer).
    #[error("outbound queue full")]
    QueueFull,
    /// The handle's session has already shut down its writer.
    #[error("connection closed")]
    Closed,
}

impl DeliveryError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Closed => "closed",
        }
    }
}
