//! Collaborator seams
//!
//! The dispatcher hands bytes to a `Transport` and asks a `TimeSync`
//! collaborator for trusted time. Neither call waits on the network from the
//! dispatcher's point of view.

use crate::errors::TransportError;
use crate::types::Payload;

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// Acknowledgement that the transport accepted a payload
///
/// Acceptance is not delivery; retry and confirmation belong to the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Number of bytes handed to the link
    pub bytes: usize,
}

impl Ack {
    pub fn for_payload(payload: &Payload) -> Self {
        Self {
            bytes: payload.len(),
        }
    }
}

/// Outbound byte hand-off
///
/// Implementations must preserve call order and must not block on network
/// round trips; buffering into a socket writer or a channel is expected.
pub trait Transport: Send + Sync {
    /// Hand a payload to the link
    fn transmit(&self, payload: &Payload) -> Result<Ack, TransportError>;

    /// Human-readable transport name for logging
    fn name(&self) -> &str {
        "transport"
    }
}

// ----------------------------------------------------------------------------
// Time Sync
// ----------------------------------------------------------------------------

/// Network time synchronization collaborator
///
/// Results arrive later through the handle's trusted-time entry point.
pub trait TimeSync: Send + Sync {
    /// Start a sync; must return without waiting for the result
    fn request_sync(&self);
}

/// Time sync that never produces a result
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTimeSync;

impl TimeSync for NoTimeSync {
    fn request_sync(&self) {}
}
