//! Centralized Configuration Management
//!
//! This module consolidates the configuration records used by the queue,
//! the quiet-period timer and the coordination actor.

use core::time::Duration;
use std::path::PathBuf;

use crate::errors::{QuietlinkError, Result};

// ----------------------------------------------------------------------------
// Queue Configuration
// ----------------------------------------------------------------------------

/// Configuration for the durable outbound queue
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Path of the queue log file (None selects the in-memory queue)
    pub path: Option<PathBuf>,
    /// Whether to fsync after every append
    pub sync_on_append: bool,
    /// Maximum size of a single payload in bytes
    pub max_payload_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: None,
            sync_on_append: true,
            max_payload_size: 1024 * 1024, // 1MB per payload
        }
    }
}

impl QueueConfig {
    /// File-backed queue at the given path
    pub fn at_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            path: None,
            sync_on_append: false,
            max_payload_size: 64 * 1024,
        }
    }
}

// ----------------------------------------------------------------------------
// Timer Configuration
// ----------------------------------------------------------------------------

/// Configuration for the quiet-period timer
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Largest quiet interval accepted from settings
    pub max_interval_millis: u64,
    /// Quiet interval applied at startup when the store has none
    pub initial_interval_millis: Option<u64>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            max_interval_millis: 24 * 60 * 60 * 1000, // one day
            initial_interval_millis: None,
        }
    }
}

impl TimerConfig {
    /// Create configuration favouring long radio silence
    pub fn low_power() -> Self {
        Self {
            max_interval_millis: 24 * 60 * 60 * 1000,
            initial_interval_millis: Some(5 * 60 * 1000), // 5 minutes
        }
    }

    /// Maximum interval as a duration
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_millis)
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the coordination channels
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for commands (producers → coordinator)
    pub command_buffer_size: usize,
    /// Buffer size for observer events (coordinator → observer)
    pub event_buffer_size: usize,
    /// Buffer size for timer firings (timer tasks → coordinator)
    pub timer_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 64,
            event_buffer_size: 128,
            timer_buffer_size: 8,
        }
    }
}

impl ChannelConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            event_buffer_size: 256,
            timer_buffer_size: 16,
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatch Configuration
// ----------------------------------------------------------------------------

/// Behaviour switches for the coordinator lifecycle
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Flush the queue on stop when the link is online
    pub flush_on_stop: bool,
    /// Ask the time-sync collaborator for trusted time at start if none exists
    pub fetch_trusted_time_on_start: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            flush_on_stop: true,
            fetch_trusted_time_on_start: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Unified Configuration
// ----------------------------------------------------------------------------

/// Complete dispatcher configuration
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QuietlinkConfig {
    pub queue: QueueConfig,
    pub timer: TimerConfig,
    pub channels: ChannelConfig,
    pub dispatch: DispatchConfig,
}

impl QuietlinkConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            queue: QueueConfig::testing(),
            timer: TimerConfig::default(),
            channels: ChannelConfig::testing(),
            dispatch: DispatchConfig::default(),
        }
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.queue.max_payload_size == 0 {
            return Err(QuietlinkError::config_error(
                "Queue max payload size must be greater than 0",
            ));
        }
        if self.queue.max_payload_size > u32::MAX as usize {
            return Err(QuietlinkError::config_error(
                "Queue max payload size must fit in a 32-bit record length",
            ));
        }
        if self.channels.command_buffer_size == 0
            || self.channels.event_buffer_size == 0
            || self.channels.timer_buffer_size == 0
        {
            return Err(QuietlinkError::config_error(
                "Channel buffer sizes must be greater than 0",
            ));
        }
        if self.timer.max_interval_millis == 0 {
            return Err(QuietlinkError::config_error(
                "Timer max interval must be greater than 0",
            ));
        }
        if let Some(initial) = self.timer.initial_interval_millis {
            if initial > self.timer.max_interval_millis {
                return Err(QuietlinkError::config_error(format!(
                    "Initial quiet interval {}ms exceeds maximum {}ms",
                    initial, self.timer.max_interval_millis
                )));
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(QuietlinkConfig::default().validate().is_ok());
        assert!(QuietlinkConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let mut config = QuietlinkConfig::default();
        config.queue.max_payload_size = 0;
        assert!(config.validate().is_err());

        let mut config = QuietlinkConfig::default();
        config.channels.command_buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = QuietlinkConfig::default();
        config.timer.initial_interval_millis = Some(config.timer.max_interval_millis + 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_queue_at_path() {
        let config = QueueConfig::at_path("/tmp/outbound.log");
        assert_eq!(config.path, Some(PathBuf::from("/tmp/outbound.log")));
        assert!(config.sync_on_append);
    }
}
