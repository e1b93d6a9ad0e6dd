//! Quietlink CLI application
//!
//! Wraps a running dispatcher whose transport writes every transmission as a
//! hex line, and turns interactive commands into handle calls.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use quietlink_core::{
    Ack, BatteryState, BluetoothHardwareState, CapabilityReport, Payload, TimeSync, Timestamp,
    Transport, TransportError, TrustedTime,
};
use quietlink_runtime::{
    DispatchOutcome, MessagingBuilder, MessagingEvent, MessagingHandle, MessagingSubsystem,
    ServerSettings,
};
use tokio::sync::mpsc;

use crate::commands::InputCommand;
use crate::config::AppConfig;
use crate::error::Result;

// ----------------------------------------------------------------------------
// Hex Line Transport
// ----------------------------------------------------------------------------

/// Transport that writes each payload as `tx <len> <hex>` on its own line
pub struct HexLineTransport {
    out: Mutex<Box<dyn Write + Send>>,
}

impl HexLineTransport {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl Transport for HexLineTransport {
    fn transmit(&self, payload: &Payload) -> std::result::Result<Ack, TransportError> {
        let mut out = self.out.lock();
        writeln!(out, "tx {} {}", payload.len(), hex::encode(payload.as_bytes()))
            .and_then(|_| out.flush())
            .map_err(|e| TransportError::SendFailed {
                reason: e.to_string(),
            })?;
        Ok(Ack::for_payload(payload))
    }

    fn name(&self) -> &str {
        "hex-lines"
    }
}

/// Time sync that asks the operator to supply trusted time
#[derive(Debug, Default)]
pub struct PromptTimeSync;

impl TimeSync for PromptTimeSync {
    fn request_sync(&self) {
        info!("Trusted time requested; enter `trusted` to provide it");
    }
}

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

/// A running dispatcher plus the CLI configuration it was started with
pub struct QuietlinkApp {
    subsystem: MessagingSubsystem,
    handle: MessagingHandle,
    config: AppConfig,
}

impl QuietlinkApp {
    /// Start the dispatcher over the given transport
    pub async fn start(config: AppConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let subsystem = MessagingBuilder::new(transport)
            .with_config(config.dispatcher.clone())
            .with_time_sync(Arc::new(PromptTimeSync))
            .start()
            .await?;
        let handle = subsystem.handle();

        Ok(Self {
            subsystem,
            handle,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn handle(&self) -> &MessagingHandle {
        &self.handle
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<MessagingEvent>> {
        self.subsystem.take_event_receiver()
    }

    /// Execute one interactive command and describe the result
    pub async fn execute(&self, command: InputCommand) -> Result<String> {
        debug!("Executing {:?}", command);
        let message = match command {
            InputCommand::Online => {
                self.handle.link_opened().await?;
                "link online".to_string()
            }
            InputCommand::Offline => {
                self.handle.link_closed().await?;
                "link offline".to_string()
            }
            InputCommand::Interval(millis) => {
                self.handle
                    .apply_settings(ServerSettings::new(millis))
                    .await?;
                format!("quiet interval: {}", self.handle.state().quiet_interval)
            }
            InputCommand::Trusted => {
                let now = Timestamp::now();
                self.handle
                    .trusted_time_acquired(TrustedTime::new(now, now, Duration::ZERO))
                    .await?;
                format!("trusted time set to {}", now)
            }
            InputCommand::Send { priority, payload } => {
                match self.handle.submit_and_wait(payload, priority).await? {
                    DispatchOutcome::Transmitted(report) if report.drained > 0 => format!(
                        "transmitted with {} queued payload(s), {} failure(s)",
                        report.drained,
                        report.failed()
                    ),
                    DispatchOutcome::Transmitted(report) if !report.is_clean() => {
                        "transmission failed".to_string()
                    }
                    DispatchOutcome::Transmitted(_) => "transmitted".to_string(),
                    DispatchOutcome::Queued => "queued".to_string(),
                    DispatchOutcome::Dropped => "dropped".to_string(),
                }
            }
            InputCommand::Capability { low_power } => {
                let report = CapabilityReport::new()
                    .with_low_power_mode(low_power)
                    .with_bluetooth_hardware(BluetoothHardwareState::PoweredOn)
                    .with_battery_state(BatteryState::Unknown);
                self.handle.report_capability(report).await?;
                "capability report submitted".to_string()
            }
            InputCommand::Flush => match self.handle.flush().await? {
                Some(report) => format!(
                    "flushed {} payload(s), {} failure(s)",
                    report.transmitted,
                    report.failed()
                ),
                None => "offline, nothing flushed".to_string(),
            },
            InputCommand::Stats => {
                let stats = self.handle.stats().await?;
                format!(
                    "submitted={} transmitted={} queued={} dropped={} flushes={} transport_failures={} queue_failures={}",
                    stats.submitted,
                    stats.transmitted,
                    stats.queued,
                    stats.dropped,
                    stats.flushes,
                    stats.transport_failures,
                    stats.queue_failures
                )
            }
            InputCommand::State => {
                let state = self.handle.state();
                format!(
                    "link={} interval={} timer={:?}{} trusted={}",
                    state.connection_state(),
                    state.quiet_interval,
                    state.timer.status,
                    if state.timer.is_pending() { " (pending)" } else { "" },
                    state.has_trusted_time()
                )
            }
            InputCommand::Help => InputCommand::help().to_string(),
            InputCommand::Quit => "bye".to_string(),
        };
        Ok(message)
    }

    /// Flush if online, stop the timer and close the queue
    pub async fn stop(&mut self) -> Result<()> {
        self.subsystem.stop().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quietlink_core::{PriorityClass, QuietlinkConfig};
    use quietlink_harness::MockTransport;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            dispatcher: QuietlinkConfig::testing(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_hex_line_transport_output() {
        let buffer = SharedBuffer::default();
        let transport = HexLineTransport::new(Box::new(buffer.clone()));

        transport.transmit(&Payload::from("hi")).unwrap();
        transport.transmit(&Payload::new(vec![0xde, 0xad])).unwrap();

        let text = String::from_utf8(buffer.0.lock().clone()).unwrap();
        assert_eq!(text, "tx 2 6869\ntx 2 dead\n");
    }

    #[tokio::test]
    async fn test_execute_send_and_flush() {
        let transport = MockTransport::new();
        let mut app = QuietlinkApp::start(test_config(), Arc::new(transport.clone()))
            .await
            .unwrap();

        let queued = InputCommand::Send {
            priority: PriorityClass::Queueable,
            payload: Payload::from("a"),
        };
        assert_eq!(app.execute(queued).await.unwrap(), "queued");
        assert_eq!(
            app.execute(InputCommand::Flush).await.unwrap(),
            "offline, nothing flushed"
        );

        app.execute(InputCommand::Online).await.unwrap();
        app.handle().stats().await.unwrap();
        assert_eq!(transport.transmitted_count(), 1);

        let sent = InputCommand::Send {
            priority: PriorityClass::Discardable,
            payload: Payload::from("b"),
        };
        assert_eq!(app.execute(sent).await.unwrap(), "transmitted");
        app.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_execute_interval_and_state() {
        let mut app = QuietlinkApp::start(test_config(), Arc::new(MockTransport::new()))
            .await
            .unwrap();

        let message = app
            .execute(InputCommand::Interval(Some(5000)))
            .await
            .unwrap();
        assert!(message.contains("5000"));

        let state = app.execute(InputCommand::State).await.unwrap();
        assert!(state.contains("(pending)"));
        assert!(state.contains("trusted=false"));

        app.execute(InputCommand::Trusted).await.unwrap();
        app.handle().stats().await.unwrap();
        let state = app.execute(InputCommand::State).await.unwrap();
        assert!(state.contains("timer=Running"));
        app.stop().await.unwrap();
    }
}
