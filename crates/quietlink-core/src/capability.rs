//! Device capability reports
//!
//! Capability observers assemble a `CapabilityReport` with whichever fields
//! they know; the report travels inside a `ClientMessage` envelope encoded
//! as an opaque payload.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::{Payload, PriorityClass};

// ----------------------------------------------------------------------------
// Capability Fields
// ----------------------------------------------------------------------------

/// Location permission granted to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationAuthStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedAlways,
    AuthorizedWhenInUse,
}

/// Bluetooth radio state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BluetoothHardwareState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

/// Battery charging state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryState {
    Unknown,
    Unplugged,
    Charging,
    Full,
}

/// Snapshot of device capabilities; absent fields were not observed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub location_services: Option<bool>,
    pub motion_and_fitness: Option<bool>,
    pub low_power_mode: Option<bool>,
    pub location_auth_status: Option<LocationAuthStatus>,
    pub bluetooth_hardware: Option<BluetoothHardwareState>,
    pub battery_state: Option<BatteryState>,
}

impl CapabilityReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location_services(mut self, enabled: bool) -> Self {
        self.location_services = Some(enabled);
        self
    }

    pub fn with_motion_and_fitness(mut self, enabled: bool) -> Self {
        self.motion_and_fitness = Some(enabled);
        self
    }

    pub fn with_low_power_mode(mut self, enabled: bool) -> Self {
        self.low_power_mode = Some(enabled);
        self
    }

    pub fn with_location_auth_status(mut self, status: LocationAuthStatus) -> Self {
        self.location_auth_status = Some(status);
        self
    }

    pub fn with_bluetooth_hardware(mut self, state: BluetoothHardwareState) -> Self {
        self.bluetooth_hardware = Some(state);
        self
    }

    pub fn with_battery_state(mut self, state: BatteryState) -> Self {
        self.battery_state = Some(state);
        self
    }

    /// Whether no capability was observed
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Priority class capability reports are submitted with
    pub fn priority(&self) -> PriorityClass {
        PriorityClass::Queueable
    }
}

// ----------------------------------------------------------------------------
// Client Message Envelope
// ----------------------------------------------------------------------------

/// Outbound message envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    Capability(CapabilityReport),
}

impl ClientMessage {
    /// Encode into an opaque payload
    pub fn encode(&self) -> Result<Payload> {
        Ok(Payload::new(bincode::serialize(self)?))
    }

    /// Decode from payload bytes
    pub fn decode(payload: &Payload) -> Result<Self> {
        Ok(bincode::deserialize(payload.as_bytes())?)
    }
}

impl From<CapabilityReport> for ClientMessage {
    fn from(report: CapabilityReport) -> Self {
        ClientMessage::Capability(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_builder() {
        let report = CapabilityReport::new()
            .with_low_power_mode(true)
            .with_battery_state(BatteryState::Charging);

        assert!(!report.is_empty());
        assert_eq!(report.low_power_mode, Some(true));
        assert_eq!(report.location_services, None);
        assert_eq!(report.priority(), PriorityClass::Queueable);
        assert!(CapabilityReport::new().is_empty());
    }

    #[test]
    fn test_envelope_preserves_absent_fields() {
        let report = CapabilityReport::new()
            .with_bluetooth_hardware(BluetoothHardwareState::PoweredOff)
            .with_location_auth_status(LocationAuthStatus::AuthorizedWhenInUse);
        let payload = ClientMessage::from(report.clone()).encode().unwrap();

        match ClientMessage::decode(&payload).unwrap() {
            ClientMessage::Capability(decoded) => {
                assert_eq!(decoded, report);
                assert_eq!(decoded.battery_state, None);
            }
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let payload = Payload::from(&[0xff, 0xff, 0xff, 0xff, 0xff][..]);
        assert!(ClientMessage::decode(&payload).is_err());
    }
}
