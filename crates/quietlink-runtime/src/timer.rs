//! Quiet-Period Timer
//!
//! A cancellable periodic task and a separate cancellable one-shot task.
//! Neither touches the queue: they only post `TimerFiring`s to the
//! coordination actor, which flushes. The timer slice of the state store is
//! written here and nowhere else.
//!
//! Every cancel bumps a generation counter. A firing that was already in the
//! channel when its task was cancelled carries the old generation and is
//! ignored by the actor.

use std::sync::Arc;
use std::time::Duration;

use quietlink_core::{SnapshotProvider, StoreAction, TimerError, Timestamp, TrustedClock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

// ----------------------------------------------------------------------------
// Firings
// ----------------------------------------------------------------------------

/// Timer callback delivered to the coordination actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFiring {
    /// The periodic timer elapsed
    Tick { generation: u64 },
    /// The one-shot timer elapsed
    FiredOnce { generation: u64 },
}

impl TimerFiring {
    pub fn generation(&self) -> u64 {
        match self {
            TimerFiring::Tick { generation } | TimerFiring::FiredOnce { generation } => *generation,
        }
    }
}

/// How a schedule request was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// No trusted time yet; the request is recorded and waits
    Pending,
    /// Periodic timer armed, first tick after one interval
    Periodic { interval_millis: u64 },
    /// One-shot armed to realign with an earlier cadence
    Aligned { delay_millis: u64 },
}

/// Delay until the next boundary of a cadence that started at `anchor`
///
/// Returns a full interval when `now` sits exactly on a boundary or lies
/// before the anchor.
pub fn alignment_delay(interval_millis: u64, anchor: Timestamp, now: Timestamp) -> u64 {
    if interval_millis == 0 {
        return 0;
    }
    let elapsed = now - anchor;
    interval_millis - (elapsed % interval_millis)
}

// ----------------------------------------------------------------------------
// Timer
// ----------------------------------------------------------------------------

/// Singleton quiet-period timer owned by the coordination actor
pub struct QuietPeriodTimer {
    store: Arc<dyn SnapshotProvider>,
    firings: mpsc::Sender<TimerFiring>,
    periodic: Option<JoinHandle<()>>,
    once: Option<JoinHandle<()>>,
    generation: u64,
}

impl QuietPeriodTimer {
    pub fn new(store: Arc<dyn SnapshotProvider>, firings: mpsc::Sender<TimerFiring>) -> Self {
        Self {
            store,
            firings,
            periodic: None,
            once: None,
            generation: 0,
        }
    }

    /// Request a periodic schedule for `interval_millis`
    ///
    /// Without a trusted clock the request is recorded as pending and the
    /// timer stays stopped. With one, the timer is armed right away.
    pub fn request_schedule(
        &mut self,
        interval_millis: u64,
        clock: Option<&TrustedClock>,
    ) -> Result<ScheduleOutcome, TimerError> {
        if interval_millis == 0 {
            return Err(TimerError::InvalidInterval { millis: 0 });
        }

        self.cancel_tasks();
        self.store.dispatch(StoreAction::TimerStopped);
        self.store
            .dispatch(StoreAction::TimerScheduleRequested { interval_millis });

        match clock {
            Some(clock) => Ok(self.arm_pending(clock).unwrap_or(ScheduleOutcome::Pending)),
            None => {
                info!(
                    "Quiet-period timer ({}ms) waiting for trusted time",
                    interval_millis
                );
                Ok(ScheduleOutcome::Pending)
            }
        }
    }

    /// Arm a pending schedule request against a trusted clock
    ///
    /// Returns `None` when nothing is pending. When the store still carries
    /// a cadence anchor for the same interval, the one-shot timer is armed
    /// for the remainder of the current period instead.
    pub fn arm_pending(&mut self, clock: &TrustedClock) -> Option<ScheduleOutcome> {
        let timer = self.store.snapshot().timer;
        if !timer.is_pending() {
            return None;
        }
        let interval_millis = timer.start_time_interval?;
        let now = clock.now();

        match timer.anchor {
            Some(anchor) if timer.interval == Some(interval_millis) => {
                let delay_millis = alignment_delay(interval_millis, anchor, now);
                info!(
                    "Realigning quiet-period timer to anchor {}: first flush in {}ms",
                    anchor, delay_millis
                );
                self.spawn_once(Duration::from_millis(delay_millis));
                self.store.dispatch(StoreAction::TimerArmedOnce);
                Some(ScheduleOutcome::Aligned { delay_millis })
            }
            _ => {
                info!("Quiet-period timer running every {}ms", interval_millis);
                self.spawn_periodic(Duration::from_millis(interval_millis));
                self.store.dispatch(StoreAction::TimerStarted {
                    anchor: now,
                    interval_millis,
                });
                Some(ScheduleOutcome::Periodic { interval_millis })
            }
        }
    }

    /// Arm the one-shot timer with an explicit delay
    pub fn schedule_once(&mut self, delay: Duration) {
        self.cancel_tasks();
        debug!("One-shot flush in {}ms", delay.as_millis());
        self.spawn_once(delay);
        self.store.dispatch(StoreAction::TimerArmedOnce);
    }

    /// Cancel both tasks, keeping the cadence anchor
    pub fn stop(&mut self) {
        self.cancel_tasks();
        self.store.dispatch(StoreAction::TimerStopped);
    }

    /// Cancel both tasks and forget the cadence anchor
    pub fn reset(&mut self) {
        self.cancel_tasks();
        self.store.dispatch(StoreAction::TimerReset);
    }

    /// Whether a firing belongs to the currently armed tasks
    pub fn accepts(&self, firing: &TimerFiring) -> bool {
        firing.generation() == self.generation
    }

    /// Whether a periodic or one-shot task is alive
    pub fn is_armed(&self) -> bool {
        self.periodic.as_ref().is_some_and(|h| !h.is_finished())
            || self.once.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel_tasks(&mut self) {
        let mut cancelled = false;
        if let Some(handle) = self.periodic.take() {
            handle.abort();
            cancelled = true;
        }
        if let Some(handle) = self.once.take() {
            handle.abort();
            cancelled = true;
        }
        self.generation += 1;
        if cancelled {
            trace!("Cancelled timer tasks (generation {})", self.generation);
        }
    }

    fn spawn_periodic(&mut self, period: Duration) {
        let firings = self.firings.clone();
        let generation = self.generation;

        self.periodic = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if firings.send(TimerFiring::Tick { generation }).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn spawn_once(&mut self, delay: Duration) {
        let firings = self.firings.clone();
        let generation = self.generation;

        self.once = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = firings.send(TimerFiring::FiredOnce { generation }).await;
        }));
    }
}

impl Drop for QuietPeriodTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.periodic.take() {
            handle.abort();
        }
        if let Some(handle) = self.once.take() {
            handle.abort();
        }
    }
}

impl core::fmt::Debug for QuietPeriodTimer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QuietPeriodTimer")
            .field("generation", &self.generation)
            .field("armed", &self.is_armed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
