//! Reactive state store
//!
//! Holds the link, quiet-interval, timer and trusted-time slices that the
//! dispatcher reads. State changes only through `StoreAction`s applied by a
//! pure reducer; subscribers are notified with the latest snapshot.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::trace;
use uuid::Uuid;

use crate::time::{Timestamp, TrustedTime};
use crate::types::{ConnectionState, QuietInterval, TimerState, TimerStatus};

// ----------------------------------------------------------------------------
// State Snapshot
// ----------------------------------------------------------------------------

/// Read model of everything the dispatcher depends on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagingState {
    /// Last reported link state (None until the first link event)
    pub connection: Option<ConnectionState>,
    /// Current quiet-period interval
    pub quiet_interval: QuietInterval,
    /// Quiet-period timer state
    pub timer: TimerState,
    /// Most recent trusted time sync, if any
    pub trusted_time: Option<TrustedTime>,
    /// Device identifier assigned by the server
    pub device_id: Option<Uuid>,
}

impl MessagingState {
    /// Effective link state; unknown is treated as offline
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.unwrap_or(ConnectionState::Offline)
    }

    pub fn is_online(&self) -> bool {
        self.connection_state().is_online()
    }

    /// Whether trusted time has been obtained at least once
    pub fn has_trusted_time(&self) -> bool {
        self.trusted_time.is_some()
    }
}

// ----------------------------------------------------------------------------
// Actions
// ----------------------------------------------------------------------------

/// State transitions understood by the reducer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoreAction {
    /// Link layer reported a state change
    LinkStateChanged(ConnectionState),
    /// Settings delivered a new quiet interval
    QuietIntervalReceived(QuietInterval),
    /// Timer schedule requested; pending until armed
    TimerScheduleRequested { interval_millis: u64 },
    /// Periodic timer armed with a fresh cadence anchor
    TimerStarted {
        anchor: Timestamp,
        interval_millis: u64,
    },
    /// One-shot timer armed; cadence anchor left as is
    TimerArmedOnce,
    /// Timer cancelled; cadence anchor kept for realignment
    TimerStopped,
    /// Timer cancelled and cadence anchor forgotten
    TimerReset,
    /// A trusted time sync completed
    TrustedTimeReceived(TrustedTime),
    /// Server assigned a device identifier
    DeviceIdAssigned(Uuid),
}

/// Apply an action to a state snapshot
pub fn reduce(state: &MessagingState, action: &StoreAction) -> MessagingState {
    let mut next = state.clone();

    match action {
        StoreAction::LinkStateChanged(connection) => {
            next.connection = Some(*connection);
        }
        StoreAction::QuietIntervalReceived(interval) => {
            next.quiet_interval = *interval;
        }
        StoreAction::TimerScheduleRequested { interval_millis } => {
            next.timer.start_time_interval = Some(*interval_millis);
        }
        StoreAction::TimerStarted {
            anchor,
            interval_millis,
        } => {
            next.timer = TimerState {
                status: TimerStatus::Running,
                start_time_interval: None,
                anchor: Some(*anchor),
                interval: Some(*interval_millis),
            };
        }
        StoreAction::TimerArmedOnce => {
            next.timer.status = TimerStatus::Running;
            next.timer.start_time_interval = None;
        }
        StoreAction::TimerStopped => {
            next.timer.status = TimerStatus::Stopped;
            next.timer.start_time_interval = None;
        }
        StoreAction::TimerReset => {
            next.timer = TimerState::default();
        }
        StoreAction::TrustedTimeReceived(trusted) => {
            next.trusted_time = Some(*trusted);
        }
        StoreAction::DeviceIdAssigned(id) => {
            next.device_id = Some(*id);
        }
    }

    next
}

// ----------------------------------------------------------------------------
// Snapshot Provider
// ----------------------------------------------------------------------------

/// Publish-subscribe contract the dispatcher depends on
pub trait SnapshotProvider: Send + Sync {
    /// Latest state snapshot
    fn snapshot(&self) -> MessagingState;

    /// Apply an action
    fn dispatch(&self, action: StoreAction);

    /// Subscribe to state changes; dropping the subscription unsubscribes
    fn subscribe(&self) -> StoreSubscription;
}

/// Live subscription to store changes
#[derive(Debug)]
pub struct StoreSubscription {
    receiver: watch::Receiver<MessagingState>,
}

impl StoreSubscription {
    /// Wait for the next change, returning the new snapshot
    ///
    /// Returns `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<MessagingState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Latest snapshot seen by this subscription
    pub fn latest(&self) -> MessagingState {
        self.receiver.borrow().clone()
    }
}

/// In-process store backed by a watch channel
#[derive(Debug)]
pub struct StateStore {
    sender: watch::Sender<MessagingState>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    /// Create a store with the default (offline, unthrottled) state
    pub fn new() -> Self {
        Self::with_state(MessagingState::default())
    }

    /// Create a store seeded with restored state
    pub fn with_state(state: MessagingState) -> Self {
        let (sender, _) = watch::channel(state);
        Self { sender }
    }
}

impl SnapshotProvider for StateStore {
    fn snapshot(&self) -> MessagingState {
        self.sender.borrow().clone()
    }

    fn dispatch(&self, action: StoreAction) {
        trace!("Store action: {:?}", action);
        self.sender.send_if_modified(|state| {
            let next = reduce(state, &action);
            if next != *state {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    fn subscribe(&self) -> StoreSubscription {
        StoreSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
