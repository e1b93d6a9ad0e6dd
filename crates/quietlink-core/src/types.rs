//! Core types for the quietlink dispatcher
//!
//! This module defines the data model shared by the queue, the state store
//! and the runtime, using newtype patterns where a raw value carries rules
//! (a zero quiet interval means "no throttling").

use core::fmt;
use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::TimerError;
use crate::time::Timestamp;

// ----------------------------------------------------------------------------
// Payload
// ----------------------------------------------------------------------------

/// Opaque outbound message bytes
///
/// Immutable once created. Identity within the queue is insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Create a payload from owned bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the payload, returning its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload carries no bytes
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 16;
        if self.0.len() <= PREVIEW {
            write!(f, "{}", hex::encode(&self.0))
        } else {
            write!(
                f,
                "{}.. ({} bytes)",
                hex::encode(&self.0[..PREVIEW]),
                self.0.len()
            )
        }
    }
}

// ----------------------------------------------------------------------------
// Priority Class
// ----------------------------------------------------------------------------

/// Delivery class attached to a payload at submission time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityClass {
    /// Safe to buffer; must not be lost while offline or throttled
    Queueable,
    /// Low value; dropped when it cannot be sent right away, never queued
    Discardable,
    /// Sent alone when possible, queued durably when offline
    Urgent,
}

impl fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityClass::Queueable => write!(f, "queueable"),
            PriorityClass::Discardable => write!(f, "discardable"),
            PriorityClass::Urgent => write!(f, "urgent"),
        }
    }
}

impl core::str::FromStr for PriorityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queueable" | "q" => Ok(PriorityClass::Queueable),
            "discardable" | "d" => Ok(PriorityClass::Discardable),
            "urgent" | "u" => Ok(PriorityClass::Urgent),
            other => Err(format!("unknown priority class: {}", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Link state as reported by the link layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Online,
    Offline,
}

impl ConnectionState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionState::Online)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Online => write!(f, "online"),
            ConnectionState::Offline => write!(f, "offline"),
        }
    }
}

// ----------------------------------------------------------------------------
// Quiet Interval
// ----------------------------------------------------------------------------

/// Minimum interval between batched transmissions, in milliseconds
///
/// A zero interval is normalized to `None`: both mean "no throttling".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QuietInterval(Option<u64>);

impl QuietInterval {
    /// No throttling
    pub const NONE: Self = Self(None);

    /// Create from a millisecond value, treating zero as no throttling
    pub fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            Self(None)
        } else {
            Self(Some(millis))
        }
    }

    /// Create from an optional millisecond value
    pub fn from_optional_millis(millis: Option<u64>) -> Self {
        millis.map(Self::from_millis).unwrap_or(Self::NONE)
    }

    /// Create from a signed value received at the settings boundary
    pub fn try_from_signed_millis(millis: i64) -> Result<Self, TimerError> {
        if millis < 0 {
            return Err(TimerError::InvalidInterval { millis });
        }
        Ok(Self::from_millis(millis as u64))
    }

    /// Get the interval in milliseconds, if throttling
    pub fn as_millis(&self) -> Option<u64> {
        self.0
    }

    /// Get the interval as a duration, if throttling
    pub fn as_duration(&self) -> Option<Duration> {
        self.0.map(Duration::from_millis)
    }

    /// Whether sends are currently throttled
    pub fn is_throttled(&self) -> bool {
        self.0.is_some()
    }

    /// Check the interval against the configured upper bound
    pub fn validate(&self, max_millis: u64) -> Result<(), TimerError> {
        match self.0 {
            Some(millis) if millis > max_millis => Err(TimerError::IntervalTooLarge {
                millis,
                max: max_millis,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for QuietInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(millis) => write!(f, "{}ms", millis),
            None => write!(f, "none"),
        }
    }
}

// ----------------------------------------------------------------------------
// Timer State
// ----------------------------------------------------------------------------

/// Whether the quiet-period timer has an active callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimerStatus {
    #[default]
    Stopped,
    Running,
}

/// Quiet-period timer state as recorded in the state store
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerState {
    /// Current timer status
    pub status: TimerStatus,
    /// Interval of a schedule request still waiting for trusted time (ms)
    pub start_time_interval: Option<u64>,
    /// Trusted time at which the current periodic cadence started
    pub anchor: Option<Timestamp>,
    /// Interval the anchor belongs to (ms)
    pub interval: Option<u64>,
}

impl TimerState {
    /// A schedule request was recorded but the timer could not be armed yet
    pub fn is_pending(&self) -> bool {
        self.status == TimerStatus::Stopped && self.start_time_interval.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
