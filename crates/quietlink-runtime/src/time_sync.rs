//! Time-Sync Gate
//!
//! Holds the trusted clock once one exists and releases timer schedule
//! requests that were deferred until then. Trust is never revoked: later
//! syncs only refine the clock.

use std::sync::Arc;

use quietlink_core::{SnapshotProvider, StoreAction, TimeSource, TrustedClock, TrustedTime};
use tracing::{debug, info};

use crate::timer::{QuietPeriodTimer, ScheduleOutcome};

pub struct TimeSyncGate {
    store: Arc<dyn SnapshotProvider>,
    source: Arc<dyn TimeSource>,
    clock: Option<TrustedClock>,
}

impl TimeSyncGate {
    /// Create the gate, restoring a clock from trusted time already in the store
    pub fn new(store: Arc<dyn SnapshotProvider>, source: Arc<dyn TimeSource>) -> Self {
        let clock = store
            .snapshot()
            .trusted_time
            .map(|trusted| TrustedClock::new(trusted, source.clone()));
        if clock.is_some() {
            debug!("Restored trusted clock from stored sync");
        }
        Self {
            store,
            source,
            clock,
        }
    }

    /// The trusted clock, if time has been synced at least once
    pub fn clock(&self) -> Option<&TrustedClock> {
        self.clock.as_ref()
    }

    pub fn is_trusted(&self) -> bool {
        self.clock.is_some()
    }

    /// Record a completed sync and arm a pending timer request
    pub fn on_trusted_time_acquired(
        &mut self,
        trusted: TrustedTime,
        timer: &mut QuietPeriodTimer,
    ) -> Option<ScheduleOutcome> {
        let first = self.clock.is_none();
        self.store.dispatch(StoreAction::TrustedTimeReceived(trusted));
        let clock = TrustedClock::new(trusted, self.source.clone());

        if first {
            info!(
                "Trusted time acquired: {} (local clock offset {}ms)",
                trusted.true_time,
                trusted.clock_offset_millis()
            );
        } else {
            debug!("Trusted time refined: {}", trusted.true_time);
        }

        let outcome = timer.arm_pending(&clock);
        self.clock = Some(clock);
        outcome
    }
}

impl core::fmt::Debug for TimeSyncGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimeSyncGate")
            .field("clock", &self.clock)
            .finish()
    }
}
