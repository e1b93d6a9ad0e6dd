//! Quietlink Core
//!
//! Foundational types for the quietlink store-and-forward dispatcher: the
//! outbound data model, the durable queue, the reactive state store, and the
//! seams to the transport and time-sync collaborators. The decision engine
//! and its timers live in `quietlink-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod capability;
pub mod config;
pub mod errors;
pub mod queue;
pub mod settings;
pub mod store;
pub mod time;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use capability::{
    BatteryState, BluetoothHardwareState, CapabilityReport, ClientMessage, LocationAuthStatus,
};
pub use config::{ChannelConfig, DispatchConfig, QueueConfig, QuietlinkConfig, TimerConfig};
pub use errors::{QueueError, QuietlinkError, QuietlinkResult, Result, TimerError, TransportError};
pub use queue::{open_queue, DurableQueue, FileQueue, MemoryQueue};
pub use settings::ServerSettings;
pub use store::{reduce, MessagingState, SnapshotProvider, StateStore, StoreAction, StoreSubscription};
pub use time::{SystemTimeSource, TimeSource, Timestamp, TrustedClock, TrustedTime};
pub use transport::{Ack, NoTimeSync, TimeSync, Transport};
pub use types::{ConnectionState, Payload, PriorityClass, QuietInterval, TimerState, TimerStatus};

/// Re-export uuid for device identifiers
pub use uuid::Uuid;
