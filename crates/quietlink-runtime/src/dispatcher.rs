//! Dispatch Coordinator
//!
//! The decision engine: for every submitted payload, pick immediate send,
//! durable queueing or discard from the link state and the quiet interval,
//! and drain the queue oldest-first whenever a flush is due.
//!
//! Transport failures during a drain are reported, not retried: drained
//! payloads have left the queue once they are handed to the transport.

use std::sync::Arc;

use quietlink_core::{
    ConnectionState, DurableQueue, Payload, PriorityClass, QueueError, QuietlinkResult, Transport,
    TransportError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::link::LinkSnapshot;

// ----------------------------------------------------------------------------
// Decision Table
// ----------------------------------------------------------------------------

/// What to do with a submitted payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchAction {
    /// Drain the queue oldest-first, then transmit the payload
    DrainAndTransmit,
    /// Append the payload to the durable queue
    Enqueue,
    /// Transmit the payload alone, leaving the queue untouched
    TransmitAlone,
    /// Drop the payload
    Discard,
}

/// Evaluate the decision table for one submission
pub fn decide(link: &LinkSnapshot, priority: PriorityClass) -> DispatchAction {
    use ConnectionState::{Offline, Online};
    use PriorityClass::{Discardable, Queueable, Urgent};

    match (link.connection, link.quiet_interval.is_throttled(), priority) {
        (Online, false, _) => DispatchAction::DrainAndTransmit,
        (Online, true, Queueable) => DispatchAction::Enqueue,
        (Online, true, Discardable) => DispatchAction::DrainAndTransmit,
        (Online, true, Urgent) => DispatchAction::TransmitAlone,
        (Offline, _, Queueable) | (Offline, _, Urgent) => DispatchAction::Enqueue,
        (Offline, _, Discardable) => DispatchAction::Discard,
    }
}

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// Result of one flush (queue drain plus any new payload)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Payloads removed from the queue
    pub drained: usize,
    /// Payloads accepted by the transport
    pub transmitted: usize,
    /// Transport errors, one per rejected payload
    pub failures: Vec<TransportError>,
}

impl FlushReport {
    /// Number of payloads the transport rejected
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// What happened to a submitted payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The payload (and possibly a drained backlog) went to the transport
    Transmitted(FlushReport),
    /// The payload was appended to the durable queue
    Queued,
    /// The payload was discarded
    Dropped,
}

/// Counters for dispatcher activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub submitted: u64,
    pub transmitted: u64,
    pub queued: u64,
    pub dropped: u64,
    pub flushes: u64,
    pub transport_failures: u64,
    pub queue_failures: u64,
}

// ----------------------------------------------------------------------------
// Coordinator
// ----------------------------------------------------------------------------

/// Applies the decision table against the queue and transport
pub struct DispatchCoordinator {
    queue: Arc<dyn DurableQueue>,
    transport: Arc<dyn Transport>,
    stats: DispatchStats,
}

impl DispatchCoordinator {
    pub fn new(queue: Arc<dyn DurableQueue>, transport: Arc<dyn Transport>) -> Self {
        Self {
            queue,
            transport,
            stats: DispatchStats::default(),
        }
    }

    /// Dispatch a payload given the link state observed at call time
    pub fn submit(
        &mut self,
        payload: Payload,
        priority: PriorityClass,
        link: &LinkSnapshot,
    ) -> QuietlinkResult<DispatchOutcome> {
        self.stats.submitted += 1;
        let action = decide(link, priority);
        debug!(
            "Dispatching {} payload ({} bytes): link={} interval={} -> {:?}",
            priority,
            payload.len(),
            link.connection,
            link.quiet_interval,
            action
        );

        match action {
            DispatchAction::DrainAndTransmit => {
                let mut report = self.drain_queue()?;
                self.transmit_into(&payload, &mut report);
                Ok(DispatchOutcome::Transmitted(report))
            }
            DispatchAction::Enqueue => {
                self.enqueue(payload)?;
                Ok(DispatchOutcome::Queued)
            }
            DispatchAction::TransmitAlone => {
                let mut report = FlushReport::default();
                self.transmit_into(&payload, &mut report);
                Ok(DispatchOutcome::Transmitted(report))
            }
            DispatchAction::Discard => {
                trace!("Discarding {} while offline", payload);
                self.stats.dropped += 1;
                Ok(DispatchOutcome::Dropped)
            }
        }
    }

    /// Drain and transmit the queue if the link is online
    pub fn flush_if_online(&mut self, link: &LinkSnapshot) -> QuietlinkResult<Option<FlushReport>> {
        if !link.is_online() {
            trace!("Skipping flush while offline");
            return Ok(None);
        }
        self.flush().map(Some)
    }

    /// Drain and transmit the queue regardless of link state
    pub fn flush(&mut self) -> QuietlinkResult<FlushReport> {
        Ok(self.drain_queue()?)
    }

    /// Number of payloads waiting in the queue
    pub fn pending(&self) -> QuietlinkResult<usize> {
        Ok(self.queue.len()?)
    }

    /// Close the underlying queue
    pub fn close(&self) -> QuietlinkResult<()> {
        Ok(self.queue.close()?)
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.clone()
    }

    fn enqueue(&mut self, payload: Payload) -> Result<(), QueueError> {
        match self.queue.append(payload) {
            Ok(()) => {
                self.stats.queued += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.queue_failures += 1;
                Err(e)
            }
        }
    }

    fn drain_queue(&mut self) -> Result<FlushReport, QueueError> {
        let payloads = self.queue.drain_all().map_err(|e| {
            self.stats.queue_failures += 1;
            e
        })?;

        let mut report = FlushReport {
            drained: payloads.len(),
            ..FlushReport::default()
        };
        if payloads.is_empty() {
            return Ok(report);
        }

        self.stats.flushes += 1;
        debug!("Flushing {} queued payloads via {}", payloads.len(), self.transport.name());
        for payload in &payloads {
            self.transmit_into(payload, &mut report);
        }
        Ok(report)
    }

    fn transmit_into(&mut self, payload: &Payload, report: &mut FlushReport) {
        match self.transport.transmit(payload) {
            Ok(ack) => {
                trace!("Transport accepted {} bytes", ack.bytes);
                report.transmitted += 1;
                self.stats.transmitted += 1;
            }
            Err(e) => {
                warn!("Transport {} rejected payload: {}", self.transport.name(), e);
                report.failures.push(e);
                self.stats.transport_failures += 1;
            }
        }
    }
}

impl core::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("transport", &self.transport.name())
            .field("stats", &self.stats)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
