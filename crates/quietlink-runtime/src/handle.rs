//! Messaging Handle
//!
//! Cloneable entry point for producers, the link layer and the time-sync
//! collaborator. Every call is a message to the coordination task; none of
//! them waits on network I/O.

use std::sync::Arc;
use std::time::Duration;

use quietlink_core::{
    CapabilityReport, ClientMessage, MessagingState, Payload, PriorityClass, QuietlinkError,
    QuietlinkResult, ServerSettings, SnapshotProvider, TrustedTime,
};
use tokio::sync::{mpsc, oneshot};

use crate::dispatcher::{DispatchOutcome, DispatchStats, FlushReport};
use crate::task::{MessagingCommand, Reply};

/// Handle to a running messaging subsystem
#[derive(Clone)]
pub struct MessagingHandle {
    commands: mpsc::Sender<MessagingCommand>,
    store: Arc<dyn SnapshotProvider>,
}

impl MessagingHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<MessagingCommand>,
        store: Arc<dyn SnapshotProvider>,
    ) -> Self {
        Self { commands, store }
    }

    /// Submit a payload without waiting for the dispatch decision
    pub async fn submit<P: Into<Payload>>(
        &self,
        payload: P,
        priority: PriorityClass,
    ) -> QuietlinkResult<()> {
        self.send(MessagingCommand::Submit {
            payload: payload.into(),
            priority,
            reply: None,
        })
        .await
    }

    /// Submit a payload and wait for what the dispatcher did with it
    pub async fn submit_and_wait<P: Into<Payload>>(
        &self,
        payload: P,
        priority: PriorityClass,
    ) -> QuietlinkResult<DispatchOutcome> {
        let payload = payload.into();
        self.request(|reply| MessagingCommand::Submit {
            payload,
            priority,
            reply: Some(reply),
        })
        .await
    }

    /// Drain the queue now if the link is online
    pub async fn flush(&self) -> QuietlinkResult<Option<FlushReport>> {
        self.request(|reply| MessagingCommand::Flush {
            stop_timer: false,
            reply,
        })
        .await
    }

    /// Drain the queue if online, then stop the quiet-period timer
    pub async fn flush_and_stop_timer(&self) -> QuietlinkResult<Option<FlushReport>> {
        self.request(|reply| MessagingCommand::Flush {
            stop_timer: true,
            reply,
        })
        .await
    }

    /// The persistent link opened
    pub async fn link_opened(&self) -> QuietlinkResult<()> {
        self.send(MessagingCommand::LinkOpened).await
    }

    /// The persistent link closed
    pub async fn link_closed(&self) -> QuietlinkResult<()> {
        self.send(MessagingCommand::LinkClosed).await
    }

    /// A network time sync completed
    pub async fn trusted_time_acquired(&self, trusted: TrustedTime) -> QuietlinkResult<()> {
        self.send(MessagingCommand::TrustedTimeAcquired(trusted))
            .await
    }

    /// Apply server-delivered settings
    ///
    /// Fails with a timer error, leaving the timer untouched, when the
    /// interval is out of bounds.
    pub async fn apply_settings(&self, settings: ServerSettings) -> QuietlinkResult<()> {
        self.request(|reply| MessagingCommand::ApplySettings { settings, reply })
            .await
    }

    /// Encode and submit a capability report
    pub async fn report_capability(&self, report: CapabilityReport) -> QuietlinkResult<()> {
        let priority = report.priority();
        let payload = ClientMessage::from(report).encode()?;
        self.submit(payload, priority).await
    }

    /// Arm the one-shot timer: flush after `delay`, then resume periodic scheduling
    pub async fn schedule_once(&self, delay: Duration) -> QuietlinkResult<()> {
        self.send(MessagingCommand::ScheduleOnce { delay }).await
    }

    /// Dispatcher counters
    pub async fn stats(&self) -> QuietlinkResult<DispatchStats> {
        self.request(|reply| MessagingCommand::Stats { reply }).await
    }

    /// Latest state store snapshot
    pub fn state(&self) -> MessagingState {
        self.store.snapshot()
    }

    /// Whether the coordination task is still accepting commands
    pub fn is_connected(&self) -> bool {
        !self.commands.is_closed()
    }

    pub(crate) async fn shutdown(&self) -> QuietlinkResult<()> {
        self.request(|reply| MessagingCommand::Shutdown { reply })
            .await
    }

    async fn send(&self, command: MessagingCommand) -> QuietlinkResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| QuietlinkError::channel_error("Messaging task is not running"))
    }

    async fn request<T, F>(&self, make: F) -> QuietlinkResult<T>
    where
        F: FnOnce(Reply<T>) -> MessagingCommand,
    {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response
            .await
            .map_err(|_| QuietlinkError::channel_error("Messaging task dropped the reply"))?
    }
}

impl core::fmt::Debug for MessagingHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessagingHandle")
            .field("connected", &self.is_connected())
            .finish()
    }
}
