//! Quietlink Runtime Engine
//!
//! This crate contains the dispatch engine for the quietlink
//! store-and-forward dispatcher, including:
//! - `DispatchCoordinator`: the decision table over the durable queue
//! - `QuietPeriodTimer`: periodic and one-shot flush timers
//! - `TimeSyncGate`: defers timer arming until trusted time exists
//! - `MessagingBuilder` / `MessagingSubsystem`: lifecycle around the single
//!   coordination task, driven through a cloneable `MessagingHandle`
//!
//! `quietlink-core` provides the data model, queue and state store this
//! engine runs on.

pub mod builder;
pub mod dispatcher;
pub mod events;
pub mod handle;
pub mod link;
mod task;
pub mod time_sync;
pub mod timer;

pub use builder::{create_test_subsystem, MessagingBuilder, MessagingSubsystem};
pub use dispatcher::{
    decide, DispatchAction, DispatchCoordinator, DispatchOutcome, DispatchStats, FlushReport,
};
pub use events::MessagingEvent;
pub use handle::MessagingHandle;
pub use link::{LinkSnapshot, LinkStateTracker};
pub use time_sync::TimeSyncGate;
pub use timer::{alignment_delay, QuietPeriodTimer, ScheduleOutcome, TimerFiring};

// Re-export core types for convenience
pub use quietlink_core::{
    CapabilityReport, ConnectionState, MessagingState, Payload, PriorityClass, QuietInterval,
    QuietlinkConfig, QuietlinkError, QuietlinkResult, ServerSettings, SnapshotProvider,
    StateStore, TimerStatus, Transport, TransportError, TrustedTime,
};
