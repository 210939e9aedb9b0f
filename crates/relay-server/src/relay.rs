//! Frame dispatch: parse the envelope, look the target up, fan out.

use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use metrics::counter;
use relay_core::{FrameError, Identity};
use tracing::{debug, warn};

use crate::frame::SignalFrame;
use crate::metrics::{FRAMES_DELIVERED_TOTAL, FRAMES_DROPPED_TOTAL, FRAMES_RECEIVED_TOTAL};
use crate::registry::Registry;

/// Result of dispatching one inbound frame.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The frame was dropped before routing.
    Malformed(FrameError),
    /// No live handle is registered for the target.
    Unreachable {
        /// Identity the frame was addressed to.
        target: Identity,
    },
    /// The frame was offered to every handle of the target.
    Delivered {
        /// Identity the frame was addressed to.
        target: Identity,
        /// Handles that accepted the frame.
        delivered: usize,
        /// Handles whose queue was full or closed.
        failed: usize,
    },
}

/// Routes frames between registered connections.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<Registry>,
    target_field: Arc<str>,
}

impl Relay {
    /// Create a relay reading the target from `target_field`.
    pub fn new(registry: Arc<Registry>, target_field: impl Into<Arc<str>>) -> Self {
        Self {
            registry,
            target_field: target_field.into(),
        }
    }

    /// The registry frames are routed through.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Name of the routing field.
    pub fn target_field(&self) -> &str {
        &self.target_field
    }

    /// Dispatch a text frame.
    pub fn dispatch(&self, raw: &str) -> DispatchOutcome {
        counter!(FRAMES_RECEIVED_TOTAL).increment(1);
        self.route(SignalFrame::parse(raw, &self.target_field))
    }

    /// Dispatch a binary frame; accepted only if it is valid UTF-8.
    pub fn dispatch_bytes(&self, raw: &[u8]) -> DispatchOutcome {
        counter!(FRAMES_RECEIVED_TOTAL).increment(1);
        self.route(SignalFrame::parse_bytes(raw, &self.target_field))
    }

    fn route(&self, parsed: Result<SignalFrame, FrameError>) -> DispatchOutcome {
        let frame = match parsed {
            Ok(frame) => frame,
            Err(e) => {
                counter!(FRAMES_DROPPED_TOTAL, "reason" => e.error_kind()).increment(1);
                return DispatchOutcome::Malformed(e);
            }
        };

        let (target, raw) = frame.into_parts();
        let handles = self.registry.lookup(&target);
        if handles.is_empty() {
            counter!(FRAMES_DROPPED_TOTAL, "reason" => "unreachable").increment(1);
            debug!(target = %target, "target not connected, frame dropped");
            return DispatchOutcome::Unreachable { target };
        }

        let payload = Utf8Bytes::from(raw);
        let mut delivered = 0;
        let mut failed = 0;
        for handle in &handles {
            match handle.send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    counter!(FRAMES_DROPPED_TOTAL, "reason" => e.error_kind()).increment(1);
                    warn!(
                        target = %target,
                        conn_id = %handle.id,
                        dropped_total = handle.drop_count(),
                        error = %e,
                        "failed to enqueue frame"
                    );
                }
            }
        }
        counter!(FRAMES_DELIVERED_TOTAL).increment(delivered as u64);
        debug!(target = %target, delivered, failed, "frame relayed");
        DispatchOutcome::Delivered {
            target,
            delivered,
            failed,
        }
    }
}
