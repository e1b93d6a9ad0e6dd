//! Server-delivered global settings

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{Result, TimerError};
use crate::types::QuietInterval;

/// Global settings pushed by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Radio-silence interval in milliseconds; zero behaves like absent
    pub radio_silence_millis: Option<u64>,
    /// Device identifier assigned by the server
    pub device_id: Option<[u8; 16]>,
}

impl ServerSettings {
    pub fn new(radio_silence_millis: Option<u64>) -> Self {
        Self {
            radio_silence_millis,
            device_id: None,
        }
    }

    /// Build settings from a signed interval received from an untrusted source
    pub fn from_signed_millis(
        radio_silence_millis: Option<i64>,
        device_id: Option<[u8; 16]>,
    ) -> core::result::Result<Self, TimerError> {
        let radio_silence_millis = match radio_silence_millis {
            Some(millis) => QuietInterval::try_from_signed_millis(millis)?.as_millis(),
            None => None,
        };
        Ok(Self {
            radio_silence_millis,
            device_id,
        })
    }

    pub fn with_device_id(mut self, id: Uuid) -> Self {
        self.device_id = Some(*id.as_bytes());
        self
    }

    /// Quiet interval these settings request
    pub fn quiet_interval(&self) -> QuietInterval {
        QuietInterval::from_optional_millis(self.radio_silence_millis)
    }

    /// Assigned device identifier, if any
    pub fn device_uuid(&self) -> Option<Uuid> {
        self.device_id.map(Uuid::from_bytes)
    }

    /// Decode settings from wire bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Encode settings to wire bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}
