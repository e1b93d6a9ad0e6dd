//! Quietlink Test Harness
//!
//! Deterministic doubles for the dispatcher's collaborators, shared by the
//! runtime and CLI tests.

pub mod clock;
pub mod mock_transport;

pub use clock::{ManualTimeSource, RecordingTimeSync};
pub use mock_transport::MockTransport;
