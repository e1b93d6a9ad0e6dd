//! Messaging Task
//!
//! The single coordination context. Submissions, link callbacks, trusted
//! time notifications, timer firings and store changes are all handled here,
//! one at a time, so the decision table and the timer never race each other.
//! Only the durable queue carries its own lock.

use std::sync::Arc;
use std::time::Duration;

use quietlink_core::{
    ConnectionState, DurableQueue, Payload, PriorityClass, QuietInterval, QuietlinkConfig,
    QuietlinkError, QuietlinkResult, ServerSettings, SnapshotProvider, StoreAction,
    StoreSubscription, TimeSource, TimeSync, TimerStatus, Transport, TrustedTime,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::dispatcher::{DispatchCoordinator, DispatchOutcome, DispatchStats, FlushReport};
use crate::events::{EventSink, MessagingEvent};
use crate::link::LinkStateTracker;
use crate::time_sync::TimeSyncGate;
use crate::timer::{QuietPeriodTimer, TimerFiring};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

pub(crate) type Reply<T> = oneshot::Sender<QuietlinkResult<T>>;

/// Requests from handles to the coordination task
#[derive(Debug)]
pub(crate) enum MessagingCommand {
    Submit {
        payload: Payload,
        priority: PriorityClass,
        reply: Option<Reply<DispatchOutcome>>,
    },
    Flush {
        stop_timer: bool,
        reply: Reply<Option<FlushReport>>,
    },
    LinkOpened,
    LinkClosed,
    TrustedTimeAcquired(TrustedTime),
    ApplySettings {
        settings: ServerSettings,
        reply: Reply<()>,
    },
    ScheduleOnce {
        delay: Duration,
    },
    Stats {
        reply: Reply<DispatchStats>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Collaborators the task is assembled from
pub(crate) struct TaskParts {
    pub store: Arc<dyn SnapshotProvider>,
    pub queue: Arc<dyn DurableQueue>,
    pub transport: Arc<dyn Transport>,
    pub time_source: Arc<dyn TimeSource>,
    pub time_sync: Arc<dyn TimeSync>,
    pub config: QuietlinkConfig,
}

/// Last values reconcile acted on
#[derive(Debug, Clone, Copy)]
struct Observed {
    connection: ConnectionState,
    interval: QuietInterval,
    timer: TimerStatus,
}

// ----------------------------------------------------------------------------
// Messaging Task
// ----------------------------------------------------------------------------

pub(crate) struct MessagingTask {
    store: Arc<dyn SnapshotProvider>,
    link: LinkStateTracker,
    coordinator: DispatchCoordinator,
    timer: QuietPeriodTimer,
    gate: TimeSyncGate,
    time_sync: Arc<dyn TimeSync>,
    config: QuietlinkConfig,
    commands: mpsc::Receiver<MessagingCommand>,
    firings: mpsc::Receiver<TimerFiring>,
    subscription: Option<StoreSubscription>,
    events: EventSink,
    observed: Observed,
    running: bool,
}

impl MessagingTask {
    pub(crate) fn new(
        parts: TaskParts,
        commands: mpsc::Receiver<MessagingCommand>,
        events: mpsc::Sender<MessagingEvent>,
    ) -> Self {
        let (firing_sender, firings) = mpsc::channel(parts.config.channels.timer_buffer_size);
        let initial = parts.store.snapshot();

        Self {
            link: LinkStateTracker::new(parts.store.clone()),
            coordinator: DispatchCoordinator::new(parts.queue, parts.transport),
            timer: QuietPeriodTimer::new(parts.store.clone(), firing_sender),
            gate: TimeSyncGate::new(parts.store.clone(), parts.time_source),
            time_sync: parts.time_sync,
            config: parts.config,
            commands,
            firings,
            subscription: None,
            events: EventSink::new(events),
            observed: Observed {
                connection: ConnectionState::Offline,
                interval: initial.quiet_interval,
                timer: initial.timer.status,
            },
            store: parts.store,
            running: true,
        }
    }

    /// Subscribe to the store, request trusted time and arm the timer if eligible
    pub(crate) fn on_start(&mut self) {
        info!("Messaging task starting");
        self.subscription = Some(self.store.subscribe());

        // No timer task survives a restart, whatever the restored state says
        self.timer.stop();

        if let Some(initial) = self.config.timer.initial_interval_millis {
            if !self.store.snapshot().quiet_interval.is_throttled() {
                self.store.dispatch(StoreAction::QuietIntervalReceived(
                    QuietInterval::from_millis(initial),
                ));
            }
        }

        if !self.gate.is_trusted() && self.config.dispatch.fetch_trusted_time_on_start {
            debug!("No trusted time yet, requesting sync");
            self.time_sync.request_sync();
        }

        let state = self.store.snapshot();
        self.observed.interval = state.quiet_interval;
        if let Some(millis) = state.quiet_interval.as_millis() {
            self.schedule(millis);
        }
        self.reconcile();
    }

    /// Run the coordination loop until shutdown
    pub(crate) async fn run(mut self) -> QuietlinkResult<()> {
        while self.running {
            tokio::select! {
                biased;

                Some(firing) = self.firings.recv() => {
                    self.handle_firing(firing);
                }

                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }

                changed = next_change(&mut self.subscription) => {
                    match changed {
                        Some(_) => self.reconcile(),
                        None => {
                            debug!("State store gone, dropping subscription");
                            self.subscription = None;
                        }
                    }
                }
            }
        }

        if !self.coordinator.is_closed() {
            self.shutdown()?;
        }
        info!("Messaging task stopped");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------------

    fn handle_command(&mut self, command: MessagingCommand) {
        trace!("Handling {:?}", command);
        match command {
            MessagingCommand::Submit {
                payload,
                priority,
                reply,
            } => {
                let link = self.link.snapshot();
                let result = self.coordinator.submit(payload, priority, &link);
                match &result {
                    Ok(DispatchOutcome::Transmitted(report)) => self.report_flush(report),
                    Ok(DispatchOutcome::Queued) => self.events.emit(MessagingEvent::Queued),
                    Ok(DispatchOutcome::Dropped) => self.events.emit(MessagingEvent::Dropped),
                    Err(e) => self.report_error(e),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            MessagingCommand::Flush { stop_timer, reply } => {
                let result = self.flush_if_online();
                if stop_timer {
                    self.timer.stop();
                    self.publish_timer_status();
                }
                let _ = reply.send(result);
            }
            MessagingCommand::LinkOpened => {
                self.link.on_link_opened();
                self.reconcile();
            }
            MessagingCommand::LinkClosed => {
                self.link.on_link_closed();
                self.reconcile();
            }
            MessagingCommand::TrustedTimeAcquired(trusted) => {
                if let Some(outcome) = self.gate.on_trusted_time_acquired(trusted, &mut self.timer) {
                    debug!("Pending timer request released: {:?}", outcome);
                }
                self.publish_timer_status();
            }
            MessagingCommand::ApplySettings { settings, reply } => {
                let result = self.apply_settings(settings);
                let _ = reply.send(result);
            }
            MessagingCommand::ScheduleOnce { delay } => {
                self.timer.schedule_once(delay);
                self.publish_timer_status();
            }
            MessagingCommand::Stats { reply } => {
                let _ = reply.send(Ok(self.coordinator.stats()));
            }
            MessagingCommand::Shutdown { reply } => {
                let result = self.shutdown();
                self.running = false;
                let _ = reply.send(result);
            }
        }
    }

    fn handle_firing(&mut self, firing: TimerFiring) {
        if !self.timer.accepts(&firing) {
            trace!("Ignoring stale {:?}", firing);
            return;
        }

        match firing {
            TimerFiring::Tick { .. } => {
                trace!("Quiet-period tick");
                let _ = self.flush_if_online();
            }
            TimerFiring::FiredOnce { .. } => {
                debug!("One-shot timer fired");
                self.timer.reset();
                let _ = self.flush_if_online();
                if let Some(millis) = self.store.snapshot().quiet_interval.as_millis() {
                    self.schedule(millis);
                }
            }
        }
        self.publish_timer_status();
    }

    fn apply_settings(&mut self, settings: ServerSettings) -> QuietlinkResult<()> {
        let interval = settings.quiet_interval();
        interval.validate(self.config.timer.max_interval_millis)?;

        debug!("Applying settings: quiet interval {}", interval);
        self.store
            .dispatch(StoreAction::QuietIntervalReceived(interval));

        if let Some(id) = settings.device_uuid() {
            if self.store.snapshot().device_id != Some(id) {
                info!("Device id assigned: {}", id);
                self.store.dispatch(StoreAction::DeviceIdAssigned(id));
                self.events.emit(MessagingEvent::DeviceIdAssigned(id));
            }
        }

        self.reconcile();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Act on link and interval changes since the last reconcile
    ///
    /// Idempotent: runs after every local change and again when the store
    /// subscription reports it.
    fn reconcile(&mut self) {
        let state = self.store.snapshot();
        let interval = state.quiet_interval;
        let connection = state.connection_state();

        if interval != self.observed.interval {
            info!("Quiet interval changed: {} -> {}", self.observed.interval, interval);
            self.observed.interval = interval;
            self.timer.reset();
            if let Some(millis) = interval.as_millis() {
                self.schedule(millis);
            }
        }

        if connection != self.observed.connection {
            self.observed.connection = connection;
            if connection.is_online() && !interval.is_throttled() {
                debug!("Link online without throttling, flushing backlog");
                let _ = self.flush_if_online();
            }
        }

        self.publish_timer_status();
    }

    fn schedule(&mut self, millis: u64) {
        match self.timer.request_schedule(millis, self.gate.clock()) {
            Ok(outcome) => debug!("Timer schedule for {}ms: {:?}", millis, outcome),
            Err(e) => warn!("Timer schedule rejected: {}", e),
        }
    }

    fn publish_timer_status(&mut self) {
        let status = self.store.snapshot().timer.status;
        if status != self.observed.timer {
            self.observed.timer = status;
            self.events.emit(MessagingEvent::TimerStateChanged(status));
        }
    }

    // ------------------------------------------------------------------------
    // Flushing and Reporting
    // ------------------------------------------------------------------------

    fn flush_if_online(&mut self) -> QuietlinkResult<Option<FlushReport>> {
        let link = self.link.snapshot();
        let result = self.coordinator.flush_if_online(&link);
        match &result {
            Ok(Some(report)) => self.report_flush(report),
            Ok(None) => {}
            Err(e) => self.report_error(e),
        }
        result
    }

    fn report_flush(&self, report: &FlushReport) {
        if report.transmitted > 0 {
            self.events.emit(MessagingEvent::Transmitted {
                count: report.transmitted,
            });
        }
        if let Some(error) = report.failures.first() {
            self.events.emit(MessagingEvent::FlushFailed {
                failed: report.failed(),
                error: error.clone(),
            });
        }
    }

    fn report_error(&self, error: &QuietlinkError) {
        error!("Dispatch failed: {}", error);
        if let QuietlinkError::Queue(queue_error) = error {
            self.events.emit(MessagingEvent::QueueFailed {
                error: queue_error.to_string(),
            });
        }
    }

    /// Flush if online, stop the timer, unsubscribe and close the queue
    fn shutdown(&mut self) -> QuietlinkResult<()> {
        info!("Shutting down messaging task");
        if self.config.dispatch.flush_on_stop {
            if let Err(e) = self.flush_if_online() {
                warn!("Final flush failed: {}", e);
            }
        }
        self.timer.stop();
        self.publish_timer_status();
        self.subscription = None;
        self.coordinator.close()
    }
}

async fn next_change(
    subscription: &mut Option<StoreSubscription>,
) -> Option<quietlink_core::MessagingState> {
    match subscription {
        Some(subscription) => subscription.changed().await,
        None => std::future::pending().await,
    }
}

impl core::fmt::Debug for MessagingTask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessagingTask")
            .field("observed", &self.observed)
            .field("running", &self.running)
            .finish()
    }
}
