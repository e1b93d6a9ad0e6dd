//! Link State Tracker
//!
//! Reads the link and quiet-interval slices from the state store and turns
//! link-layer callbacks into store actions. The tracker keeps no copy of its
//! own; every read goes to the latest snapshot.

use std::sync::Arc;

use quietlink_core::{ConnectionState, QuietInterval, SnapshotProvider, StoreAction};
use tracing::{debug, info};

/// Link facts the decision table depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub connection: ConnectionState,
    pub quiet_interval: QuietInterval,
}

impl LinkSnapshot {
    pub fn new(connection: ConnectionState, quiet_interval: QuietInterval) -> Self {
        Self {
            connection,
            quiet_interval,
        }
    }

    pub fn is_online(&self) -> bool {
        self.connection.is_online()
    }
}

/// Store-backed view of the link
#[derive(Clone)]
pub struct LinkStateTracker {
    store: Arc<dyn SnapshotProvider>,
}

impl LinkStateTracker {
    pub fn new(store: Arc<dyn SnapshotProvider>) -> Self {
        Self { store }
    }

    /// Current link state and quiet interval
    pub fn snapshot(&self) -> LinkSnapshot {
        let state = self.store.snapshot();
        LinkSnapshot::new(state.connection_state(), state.quiet_interval)
    }

    /// The persistent link finished opening
    pub fn on_link_opened(&self) {
        info!("Link opened");
        self.set_connection(ConnectionState::Online);
    }

    /// The persistent link closed or failed
    pub fn on_link_closed(&self) {
        info!("Link closed");
        self.set_connection(ConnectionState::Offline);
    }

    fn set_connection(&self, connection: ConnectionState) {
        debug!("Recording link state {}", connection);
        self.store.dispatch(StoreAction::LinkStateChanged(connection));
    }
}

impl core::fmt::Debug for LinkStateTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinkStateTracker")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
