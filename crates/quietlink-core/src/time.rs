//! Time primitives
//!
//! Wall-clock timestamps, the injectable `TimeSource`, and the trusted clock
//! that projects the last network-synchronized time forward.

use core::ops::{Add, Sub};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Add<u64> for Timestamp {
    type Output = Timestamp;

    fn add(self, other: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(other))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get current wall-clock timestamp
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get duration since another timestamp (zero if `other` is later)
    pub fn duration_since(&self, other: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

impl core::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Source of local (untrusted) wall-clock time
///
/// Injected so tests can drive the trusted clock deterministically.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Standard library implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Trusted Time
// ----------------------------------------------------------------------------

/// Result of one successful network time synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedTime {
    /// Network-synchronized time at the moment of sync
    pub true_time: Timestamp,
    /// Time since device boot at the moment of sync
    pub boot_interval: Duration,
    /// Local wall-clock time at the moment of sync
    pub system_time: Timestamp,
    /// Derived time of the last device reboot
    pub last_reboot: Timestamp,
}

impl TrustedTime {
    /// Build a sync record from the true time and the local clock reading
    pub fn new(true_time: Timestamp, system_time: Timestamp, boot_interval: Duration) -> Self {
        let boot_millis = boot_interval.as_millis() as u64;
        Self {
            true_time,
            boot_interval,
            system_time,
            last_reboot: Timestamp::new(true_time.as_millis().saturating_sub(boot_millis)),
        }
    }

    /// Offset of the local clock relative to trusted time, in milliseconds
    pub fn clock_offset_millis(&self) -> i64 {
        self.system_time.as_millis() as i64 - self.true_time.as_millis() as i64
    }
}

/// Projects the last trusted time forward using the local time source
#[derive(Clone)]
pub struct TrustedClock {
    trusted: TrustedTime,
    source: Arc<dyn TimeSource>,
}

impl TrustedClock {
    pub fn new(trusted: TrustedTime, source: Arc<dyn TimeSource>) -> Self {
        Self { trusted, source }
    }

    /// Current trusted time estimate
    pub fn now(&self) -> Timestamp {
        let elapsed = self.source.now() - self.trusted.system_time;
        self.trusted.true_time + elapsed
    }

    /// The sync record this clock is anchored to
    pub fn trusted_time(&self) -> &TrustedTime {
        &self.trusted
    }
}

impl core::fmt::Debug for TrustedClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrustedClock")
            .field("trusted", &self.trusted)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
