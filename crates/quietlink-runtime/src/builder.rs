//! Messaging Builder API
//!
//! Assembles the dispatcher from its collaborators and owns its lifecycle:
//! `start` opens the queue, subscribes to the store and arms the timer when
//! eligible; `stop` flushes if online, cancels the timer, unsubscribes and
//! closes the queue.

use std::sync::Arc;

use quietlink_core::{
    open_queue, DurableQueue, MessagingState, NoTimeSync, QuietlinkConfig, QuietlinkError,
    QuietlinkResult, SnapshotProvider, StateStore, SystemTimeSource, TimeSource, TimeSync,
    Transport,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::events::MessagingEvent;
use crate::handle::MessagingHandle;
use crate::task::{MessagingTask, TaskParts};

// ----------------------------------------------------------------------------
// Messaging Builder
// ----------------------------------------------------------------------------

/// Builder for a messaging subsystem
pub struct MessagingBuilder {
    transport: Arc<dyn Transport>,
    config: QuietlinkConfig,
    queue: Option<Arc<dyn DurableQueue>>,
    store: Option<Arc<dyn SnapshotProvider>>,
    time_source: Arc<dyn TimeSource>,
    time_sync: Arc<dyn TimeSync>,
}

impl MessagingBuilder {
    /// Create a builder around the outbound transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: QuietlinkConfig::default(),
            queue: None,
            store: None,
            time_source: Arc::new(SystemTimeSource::new()),
            time_sync: Arc::new(NoTimeSync),
        }
    }

    /// Set the dispatcher configuration
    pub fn with_config(mut self, config: QuietlinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already opened queue instead of the configured one
    pub fn with_queue(mut self, queue: Arc<dyn DurableQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Share an existing state store
    pub fn with_store(mut self, store: Arc<dyn SnapshotProvider>) -> Self {
        self.store = Some(store);
        self
    }

    /// Local clock used to project trusted time
    pub fn with_time_source(mut self, source: Arc<dyn TimeSource>) -> Self {
        self.time_source = source;
        self
    }

    /// Collaborator asked for trusted time at start
    pub fn with_time_sync(mut self, time_sync: Arc<dyn TimeSync>) -> Self {
        self.time_sync = time_sync;
        self
    }

    /// Open the queue and start the coordination task
    pub async fn start(self) -> QuietlinkResult<MessagingSubsystem> {
        self.config.validate()?;
        info!("Starting messaging subsystem via {}", self.transport.name());

        let queue = match self.queue {
            Some(queue) => queue,
            None => open_queue(&self.config.queue)?,
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(StateStore::new()) as Arc<dyn SnapshotProvider>);

        let (command_sender, command_receiver) =
            mpsc::channel(self.config.channels.command_buffer_size);
        let (event_sender, event_receiver) =
            mpsc::channel(self.config.channels.event_buffer_size);

        let parts = TaskParts {
            store: store.clone(),
            queue,
            transport: self.transport,
            time_source: self.time_source,
            time_sync: self.time_sync,
            config: self.config,
        };
        let mut task = MessagingTask::new(parts, command_receiver, event_sender);
        task.on_start();
        let task_handle = tokio::spawn(task.run());

        info!("Messaging subsystem started");
        Ok(MessagingSubsystem {
            handle: MessagingHandle::new(command_sender, store.clone()),
            store,
            event_receiver: Some(event_receiver),
            task: Some(task_handle),
        })
    }
}

// ----------------------------------------------------------------------------
// Messaging Subsystem
// ----------------------------------------------------------------------------

/// A running dispatcher
pub struct MessagingSubsystem {
    handle: MessagingHandle,
    store: Arc<dyn SnapshotProvider>,
    event_receiver: Option<mpsc::Receiver<MessagingEvent>>,
    task: Option<JoinHandle<QuietlinkResult<()>>>,
}

impl MessagingSubsystem {
    /// Get a handle for submitting payloads and reporting link changes
    pub fn handle(&self) -> MessagingHandle {
        self.handle.clone()
    }

    /// The state store the dispatcher reads
    pub fn store(&self) -> Arc<dyn SnapshotProvider> {
        self.store.clone()
    }

    /// Latest state snapshot
    pub fn state(&self) -> MessagingState {
        self.store.snapshot()
    }

    /// Take the observer event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<MessagingEvent>> {
        self.event_receiver.take()
    }

    /// Check if the coordination task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the subsystem and wait for the queue to close
    pub async fn stop(&mut self) -> QuietlinkResult<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        info!("Stopping messaging subsystem");
        let result = self.handle.shutdown().await;
        match task.await {
            Ok(_) => {}
            Err(e) => {
                return Err(QuietlinkError::channel_error(format!(
                    "Messaging task panicked: {}",
                    e
                )))
            }
        }
        info!("Messaging subsystem stopped");
        result
    }
}

impl core::fmt::Debug for MessagingSubsystem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessagingSubsystem")
            .field("running", &self.is_running())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Start a subsystem over an in-memory queue with test channel sizes
pub async fn create_test_subsystem(
    transport: Arc<dyn Transport>,
) -> QuietlinkResult<MessagingSubsystem> {
    MessagingBuilder::new(transport)
        .with_config(QuietlinkConfig::testing())
        .start()
        .await
}
