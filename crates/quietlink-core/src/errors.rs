//! Error types for the quietlink dispatcher
//!
//! This module contains the error types used throughout the dispatcher core,
//! grouped by concern (durable queue, transport hand-off, timer scheduling),
//! and the `QuietlinkError` type that unifies them.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Durable queue error types
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,
    #[error("Queue I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Queue log corrupt at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Transport hand-off error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Link is down")]
    LinkDown,
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
    #[error("Transport shutdown")]
    Shutdown,
}

/// Quiet-period timer scheduling error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("Invalid quiet interval: {millis}ms")]
    InvalidInterval { millis: i64 },
    #[error("Quiet interval {millis}ms exceeds maximum of {max}ms")]
    IntervalTooLarge { millis: u64, max: u64 },
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for the quietlink dispatcher
#[derive(Debug, thiserror::Error)]
pub enum QuietlinkError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Coordination channel error (actor gone or reply dropped)
    #[error("Channel error: {message}")]
    Channel { message: String },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl QuietlinkError {
    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        QuietlinkError::Channel {
            message: message.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        QuietlinkError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether this error means the queue has been shut down
    pub fn is_queue_closed(&self) -> bool {
        matches!(self, QuietlinkError::Queue(QueueError::Closed))
    }
}

impl QueueError {
    /// Create a corruption error at the given log offset
    pub fn corrupt<T: Into<String>>(offset: u64, reason: T) -> Self {
        QueueError::Corrupt {
            offset,
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, QuietlinkError>;
pub type QuietlinkResult<T> = Result<T>;
