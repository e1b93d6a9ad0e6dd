//! Observer events

use quietlink_core::{TimerStatus, TransportError, Uuid};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// Notification for whoever observes the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingEvent {
    /// Payloads accepted by the transport in one dispatch or flush
    Transmitted { count: usize },
    /// A payload was appended to the durable queue
    Queued,
    /// A discardable payload was dropped while offline
    Dropped,
    /// The transport rejected payloads during a flush
    FlushFailed { failed: usize, error: TransportError },
    /// The durable queue failed an append or drain
    QueueFailed { error: String },
    /// The quiet-period timer started or stopped
    TimerStateChanged(TimerStatus),
    /// The server assigned a device identifier
    DeviceIdAssigned(Uuid),
}

/// Non-blocking event publisher; a lagging observer loses events
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: mpsc::Sender<MessagingEvent>,
}

impl EventSink {
    pub(crate) fn new(sender: mpsc::Sender<MessagingEvent>) -> Self {
        Self { sender }
    }

    pub(crate) fn emit(&self, event: MessagingEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => trace!("Observer lagging, dropped {:?}", event),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_channel_drops_instead_of_blocking() {
        let (sender, mut receiver) = mpsc::channel(1);
        let sink = EventSink::new(sender);

        sink.emit(MessagingEvent::Queued);
        sink.emit(MessagingEvent::Dropped);

        assert_eq!(receiver.try_recv().unwrap(), MessagingEvent::Queued);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        EventSink::new(sender).emit(MessagingEvent::Queued);
    }
}
