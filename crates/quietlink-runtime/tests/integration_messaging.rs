//! Integration tests for the messaging subsystem
//!
//! Runs the full coordination task against the mock transport, an in-memory
//! or file queue, and paused tokio time for the quiet-period timer.

use std::sync::Arc;
use std::time::Duration;

use quietlink_core::{
    DurableQueue, MemoryQueue, QueueConfig, StoreAction, TimeSource, TimerError, Timestamp,
};
use quietlink_harness::{ManualTimeSource, MockTransport, RecordingTimeSync};
use quietlink_runtime::{
    CapabilityReport, ConnectionState, DispatchOutcome, MessagingBuilder, MessagingEvent,
    MessagingSubsystem, PriorityClass, QuietlinkConfig, QuietlinkError, ServerSettings,
    SnapshotProvider, StateStore, TimerStatus, TrustedTime,
};
use tokio::time::timeout;

struct Fixture {
    subsystem: MessagingSubsystem,
    transport: MockTransport,
    queue: Arc<MemoryQueue>,
    clock: Arc<ManualTimeSource>,
}

async fn start() -> Fixture {
    start_with(QuietlinkConfig::testing()).await
}

async fn start_with(config: QuietlinkConfig) -> Fixture {
    let transport = MockTransport::new();
    let queue = Arc::new(MemoryQueue::new());
    let clock = Arc::new(ManualTimeSource::new(Timestamp::new(1_000_000)));

    let subsystem = MessagingBuilder::new(Arc::new(transport.clone()))
        .with_config(config)
        .with_queue(queue.clone())
        .with_time_source(clock.clone())
        .start()
        .await
        .expect("Failed to start messaging subsystem");

    Fixture {
        subsystem,
        transport,
        queue,
        clock,
    }
}

fn trusted_now(clock: &ManualTimeSource) -> TrustedTime {
    TrustedTime::new(clock.now(), clock.now(), Duration::from_secs(60))
}

fn bytes(values: &[&str]) -> Vec<Vec<u8>> {
    values.iter().map(|v| v.as_bytes().to_vec()).collect()
}

// ----------------------------------------------------------------------------
// Offline buffering
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_offline_backlog_transmitted_in_order_on_reconnect() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    handle.submit("q1", PriorityClass::Queueable).await.unwrap();
    handle.submit("u1", PriorityClass::Urgent).await.unwrap();
    handle.submit("q2", PriorityClass::Queueable).await.unwrap();
    assert_eq!(handle.stats().await.unwrap().queued, 3);
    assert_eq!(fx.transport.transmitted_count(), 0);

    handle.link_opened().await.unwrap();
    handle
        .submit_and_wait("after", PriorityClass::Queueable)
        .await
        .unwrap();

    assert_eq!(
        fx.transport.transmitted_bytes(),
        bytes(&["q1", "u1", "q2", "after"])
    );
    assert!(fx.queue.is_empty().unwrap());
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_offline_discardable_then_queueable_scenario() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    let outcome = handle
        .submit_and_wait("C", PriorityClass::Discardable)
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Dropped);
    assert!(fx.queue.is_empty().unwrap());

    let outcome = handle
        .submit_and_wait("D", PriorityClass::Queueable)
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Queued);
    assert_eq!(fx.queue.len().unwrap(), 1);

    handle.link_opened().await.unwrap();
    handle.stats().await.unwrap();

    assert_eq!(fx.transport.transmitted_bytes(), bytes(&["D"]));
    assert!(fx.queue.is_empty().unwrap());
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_unthrottling_while_online_drains_on_next_submit() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    handle.link_opened().await.unwrap();
    handle
        .apply_settings(ServerSettings::new(Some(5000)))
        .await
        .unwrap();
    handle.submit("a", PriorityClass::Queueable).await.unwrap();
    handle.submit("b", PriorityClass::Queueable).await.unwrap();
    handle.stats().await.unwrap();
    assert_eq!(fx.queue.len().unwrap(), 2);

    handle
        .apply_settings(ServerSettings::new(Some(0)))
        .await
        .unwrap();
    assert_eq!(fx.transport.transmitted_count(), 0);

    let outcome = handle
        .submit_and_wait("c", PriorityClass::Urgent)
        .await
        .unwrap();
    match outcome {
        DispatchOutcome::Transmitted(report) => assert_eq!(report.drained, 2),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(fx.transport.transmitted_bytes(), bytes(&["a", "b", "c"]));
    assert_eq!(fx.subsystem.state().timer.status, TimerStatus::Stopped);
    fx.subsystem.stop().await.unwrap();
}

// ----------------------------------------------------------------------------
// Quiet-period timer
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_throttled_scenario_with_timer_tick() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    handle.link_opened().await.unwrap();
    handle
        .trusted_time_acquired(trusted_now(&fx.clock))
        .await
        .unwrap();
    handle
        .apply_settings(ServerSettings::new(Some(5000)))
        .await
        .unwrap();
    assert_eq!(fx.subsystem.state().timer.status, TimerStatus::Running);

    let outcome = handle
        .submit_and_wait("A", PriorityClass::Queueable)
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Queued);

    handle
        .submit_and_wait("B", PriorityClass::Urgent)
        .await
        .unwrap();
    assert_eq!(fx.transport.transmitted_bytes(), bytes(&["B"]));
    assert_eq!(fx.queue.len().unwrap(), 1);

    // Paused time advances to the first tick once everything is idle
    fx.transport.wait_for_transmissions(2).await;
    assert_eq!(fx.transport.transmitted_bytes(), bytes(&["B", "A"]));
    assert!(fx.queue.is_empty().unwrap());
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_tick_while_offline_keeps_queue() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    handle
        .trusted_time_acquired(trusted_now(&fx.clock))
        .await
        .unwrap();
    handle
        .apply_settings(ServerSettings::new(Some(1000)))
        .await
        .unwrap();
    handle.submit("kept", PriorityClass::Queueable).await.unwrap();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    handle.stats().await.unwrap();

    assert_eq!(fx.transport.transmitted_count(), 0);
    assert_eq!(fx.queue.len().unwrap(), 1);
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_initial_interval_throttles_from_start() {
    let mut config = QuietlinkConfig::testing();
    config.timer.initial_interval_millis = Some(5000);
    let mut fx = start_with(config).await;
    let handle = fx.subsystem.handle();

    handle.link_opened().await.unwrap();
    handle.stats().await.unwrap();

    let state = fx.subsystem.state();
    assert_eq!(state.quiet_interval.as_millis(), Some(5000));
    assert!(state.timer.is_pending());

    let outcome = handle
        .submit_and_wait("held", PriorityClass::Queueable)
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Queued);
    assert_eq!(fx.transport.transmitted_count(), 0);
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_schedule_waits_for_trusted_time() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();
    let mut events = fx.subsystem.take_event_receiver().unwrap();

    handle
        .apply_settings(ServerSettings::new(Some(5000)))
        .await
        .unwrap();
    let state = fx.subsystem.state();
    assert_eq!(state.timer.status, TimerStatus::Stopped);
    assert!(state.timer.is_pending());
    assert!(!state.has_trusted_time());

    handle
        .trusted_time_acquired(trusted_now(&fx.clock))
        .await
        .unwrap();
    handle.stats().await.unwrap();

    let state = fx.subsystem.state();
    assert_eq!(state.timer.status, TimerStatus::Running);
    assert!(!state.timer.is_pending());
    assert_eq!(state.timer.anchor, Some(fx.clock.now()));

    let event = timeout(Duration::from_secs(1), async {
        loop {
            match events.recv().await {
                Some(MessagingEvent::TimerStateChanged(status)) => return Some(status),
                Some(_) => continue,
                None => return None,
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(event, Some(TimerStatus::Running));
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fire_once_flushes_once_then_reschedules() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    handle.link_opened().await.unwrap();
    handle
        .trusted_time_acquired(trusted_now(&fx.clock))
        .await
        .unwrap();
    handle
        .apply_settings(ServerSettings::new(Some(5000)))
        .await
        .unwrap();
    handle
        .submit_and_wait("A", PriorityClass::Queueable)
        .await
        .unwrap();

    fx.clock.advance(100);
    handle
        .schedule_once(Duration::from_millis(100))
        .await
        .unwrap();
    fx.transport.wait_for_transmissions(1).await;

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.flushes, 1);
    assert_eq!(fx.transport.transmitted_bytes(), bytes(&["A"]));

    let timer = fx.subsystem.state().timer;
    assert_eq!(timer.status, TimerStatus::Running);
    assert!(!timer.is_pending());
    assert_eq!(timer.interval, Some(5000));
    assert_eq!(timer.anchor, Some(fx.clock.now()));

    // The fire leaves exactly one cadence behind: a new payload waits out a
    // full interval and goes out once
    let outcome = handle
        .submit_and_wait("B", PriorityClass::Queueable)
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Queued);

    tokio::time::advance(Duration::from_millis(4_900)).await;
    handle.stats().await.unwrap();
    assert_eq!(fx.queue.len().unwrap(), 1);
    assert_eq!(fx.transport.transmitted_count(), 1);

    fx.transport.wait_for_transmissions(2).await;
    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.flushes, 2);
    assert_eq!(fx.transport.transmitted_bytes(), bytes(&["A", "B"]));
    assert!(fx.queue.is_empty().unwrap());
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_interval_change_rearms_and_clearing_stops() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    handle
        .trusted_time_acquired(trusted_now(&fx.clock))
        .await
        .unwrap();
    handle
        .apply_settings(ServerSettings::new(Some(5000)))
        .await
        .unwrap();
    assert_eq!(fx.subsystem.state().timer.interval, Some(5000));

    fx.clock.advance(1234);
    handle
        .apply_settings(ServerSettings::new(Some(8000)))
        .await
        .unwrap();
    let timer = fx.subsystem.state().timer;
    assert_eq!(timer.status, TimerStatus::Running);
    assert_eq!(timer.interval, Some(8000));
    assert_eq!(timer.anchor, Some(fx.clock.now()));

    handle
        .apply_settings(ServerSettings::new(None))
        .await
        .unwrap();
    let timer = fx.subsystem.state().timer;
    assert_eq!(timer.status, TimerStatus::Stopped);
    assert_eq!(timer.anchor, None);
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_flush_and_stop_timer() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    handle
        .trusted_time_acquired(trusted_now(&fx.clock))
        .await
        .unwrap();
    handle
        .apply_settings(ServerSettings::new(Some(5000)))
        .await
        .unwrap();
    handle.submit("x", PriorityClass::Queueable).await.unwrap();

    // Offline: nothing to flush, but the timer still stops
    assert_eq!(handle.flush_and_stop_timer().await.unwrap(), None);
    assert_eq!(fx.subsystem.state().timer.status, TimerStatus::Stopped);
    assert_eq!(fx.queue.len().unwrap(), 1);

    handle.link_opened().await.unwrap();
    let report = handle.flush().await.unwrap().unwrap();
    assert_eq!(report.transmitted, 1);
    fx.subsystem.stop().await.unwrap();
}

// ----------------------------------------------------------------------------
// Settings, capabilities and events
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_out_of_bounds_interval_leaves_timer_unchanged() {
    let mut config = QuietlinkConfig::testing();
    config.timer.max_interval_millis = 10_000;
    let mut fx = start_with(config).await;
    let handle = fx.subsystem.handle();

    handle
        .apply_settings(ServerSettings::new(Some(5000)))
        .await
        .unwrap();
    let before = fx.subsystem.state();

    let err = handle
        .apply_settings(ServerSettings::new(Some(20_000)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QuietlinkError::Timer(TimerError::IntervalTooLarge { .. })
    ));
    assert_eq!(fx.subsystem.state(), before);

    assert!(ServerSettings::from_signed_millis(Some(-1), None).is_err());
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_device_id_assignment_event() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();
    let mut events = fx.subsystem.take_event_receiver().unwrap();

    let id = quietlink_core::Uuid::new_v4();
    handle
        .apply_settings(ServerSettings::new(None).with_device_id(id))
        .await
        .unwrap();
    // Same id again does not re-announce
    handle
        .apply_settings(ServerSettings::new(None).with_device_id(id))
        .await
        .unwrap();
    fx.subsystem.stop().await.unwrap();

    let mut assigned = Vec::new();
    while let Some(event) = events.recv().await {
        if let MessagingEvent::DeviceIdAssigned(id) = event {
            assigned.push(id);
        }
    }
    assert_eq!(assigned, vec![id]);
    assert_eq!(fx.subsystem.state().device_id, Some(id));
}

#[tokio::test]
async fn test_capability_report_is_queued_offline() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    handle
        .report_capability(CapabilityReport::new().with_low_power_mode(true))
        .await
        .unwrap();
    handle.stats().await.unwrap();
    assert_eq!(fx.queue.len().unwrap(), 1);

    handle.link_opened().await.unwrap();
    handle.stats().await.unwrap();
    let sent = fx.transport.transmitted();
    assert_eq!(sent.len(), 1);
    match quietlink_core::ClientMessage::decode(&sent[0]).unwrap() {
        quietlink_core::ClientMessage::Capability(report) => {
            assert_eq!(report.low_power_mode, Some(true))
        }
    }
    fx.subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_transport_failure_reported_not_requeued() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();
    let mut events = fx.subsystem.take_event_receiver().unwrap();

    handle.submit("a", PriorityClass::Queueable).await.unwrap();
    handle.submit("b", PriorityClass::Queueable).await.unwrap();
    fx.transport.fail_next(1);
    handle.link_opened().await.unwrap();
    let stats = handle.stats().await.unwrap();

    assert_eq!(stats.transport_failures, 1);
    assert_eq!(fx.transport.transmitted_bytes(), bytes(&["b"]));
    assert!(fx.queue.is_empty().unwrap());
    fx.subsystem.stop().await.unwrap();

    let mut failed = false;
    while let Some(event) = events.recv().await {
        if let MessagingEvent::FlushFailed { failed: count, .. } = event {
            assert_eq!(count, 1);
            failed = true;
        }
    }
    assert!(failed);
}

// ----------------------------------------------------------------------------
// Store coupling and lifecycle
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_external_store_change_triggers_flush() {
    let store: Arc<dyn SnapshotProvider> = Arc::new(StateStore::new());
    let transport = MockTransport::new();
    let mut subsystem = MessagingBuilder::new(Arc::new(transport.clone()))
        .with_config(QuietlinkConfig::testing())
        .with_store(store.clone())
        .start()
        .await
        .unwrap();
    let handle = subsystem.handle();

    handle
        .submit_and_wait("D", PriorityClass::Queueable)
        .await
        .unwrap();
    store.dispatch(StoreAction::LinkStateChanged(ConnectionState::Online));

    timeout(Duration::from_secs(1), transport.wait_for_transmissions(1))
        .await
        .expect("Backlog was not flushed after external link change");
    assert_eq!(transport.transmitted_bytes(), bytes(&["D"]));
    subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_flushes_when_online_and_closes_queue() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    handle.link_opened().await.unwrap();
    handle
        .apply_settings(ServerSettings::new(Some(60_000)))
        .await
        .unwrap();
    handle.submit("pending", PriorityClass::Queueable).await.unwrap();
    handle.stats().await.unwrap();
    assert_eq!(fx.transport.transmitted_count(), 0);

    fx.subsystem.stop().await.unwrap();
    assert_eq!(fx.transport.transmitted_bytes(), bytes(&["pending"]));
    assert!(fx.queue.is_closed());
    assert_eq!(fx.subsystem.state().timer.status, TimerStatus::Stopped);
}

#[tokio::test]
async fn test_file_queue_survives_restart() {
    let path = std::env::temp_dir()
        .join("quietlink-runtime-tests")
        .join(format!("restart-{}.log", quietlink_core::Uuid::new_v4()));
    let mut config = QuietlinkConfig::testing();
    config.queue = QueueConfig {
        path: Some(path.clone()),
        ..QueueConfig::testing()
    };

    let transport = MockTransport::new();
    {
        let mut subsystem = MessagingBuilder::new(Arc::new(transport.clone()))
            .with_config(config.clone())
            .start()
            .await
            .unwrap();
        let handle = subsystem.handle();
        handle.submit("first", PriorityClass::Queueable).await.unwrap();
        handle.submit("second", PriorityClass::Urgent).await.unwrap();
        subsystem.stop().await.unwrap();
    }
    assert_eq!(transport.transmitted_count(), 0);

    let mut subsystem = MessagingBuilder::new(Arc::new(transport.clone()))
        .with_config(config)
        .start()
        .await
        .unwrap();
    subsystem.handle().link_opened().await.unwrap();
    subsystem.handle().stats().await.unwrap();

    assert_eq!(transport.transmitted_bytes(), bytes(&["first", "second"]));
    subsystem.stop().await.unwrap();
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_restart_realigns_to_previous_cadence() {
    let store: Arc<dyn SnapshotProvider> = Arc::new(StateStore::new());
    let clock = Arc::new(ManualTimeSource::new(Timestamp::new(100_000)));
    let transport = MockTransport::new();

    let build = || {
        MessagingBuilder::new(Arc::new(transport.clone()))
            .with_config(QuietlinkConfig::testing())
            .with_store(store.clone())
            .with_time_source(clock.clone())
    };

    let mut subsystem = build().start().await.unwrap();
    let handle = subsystem.handle();
    handle
        .trusted_time_acquired(trusted_now(&clock))
        .await
        .unwrap();
    handle
        .apply_settings(ServerSettings::new(Some(5000)))
        .await
        .unwrap();
    let anchor = store.snapshot().timer.anchor;
    assert_eq!(anchor, Some(Timestamp::new(100_000)));
    subsystem.stop().await.unwrap();
    assert_eq!(store.snapshot().timer.anchor, anchor);

    clock.advance(2_000);
    let mut subsystem = build().start().await.unwrap();
    let timer = store.snapshot().timer;
    assert_eq!(timer.status, TimerStatus::Running);
    assert_eq!(timer.anchor, anchor);
    subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_trusted_time_requested_on_start() {
    let time_sync = Arc::new(RecordingTimeSync::new());
    let mut subsystem = MessagingBuilder::new(Arc::new(MockTransport::new()))
        .with_config(QuietlinkConfig::testing())
        .with_time_sync(time_sync.clone())
        .start()
        .await
        .unwrap();
    assert_eq!(time_sync.requests(), 1);
    subsystem.stop().await.unwrap();

    // Already trusted: no request
    let store: Arc<dyn SnapshotProvider> = Arc::new(StateStore::new());
    store.dispatch(StoreAction::TrustedTimeReceived(TrustedTime::new(
        Timestamp::new(5),
        Timestamp::new(5),
        Duration::ZERO,
    )));
    let time_sync = Arc::new(RecordingTimeSync::new());
    let mut subsystem = MessagingBuilder::new(Arc::new(MockTransport::new()))
        .with_config(QuietlinkConfig::testing())
        .with_store(store)
        .with_time_sync(time_sync.clone())
        .start()
        .await
        .unwrap();
    assert_eq!(time_sync.requests(), 0);
    subsystem.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_producers_lose_nothing() {
    let mut fx = start().await;
    let handle = fx.subsystem.handle();

    let producers = (0..4u8).map(|producer| {
        let handle = handle.clone();
        async move {
            for i in 0..25u8 {
                handle
                    .submit(vec![producer, i], PriorityClass::Queueable)
                    .await
                    .unwrap();
            }
        }
    });
    futures::future::join_all(producers).await;

    handle.link_opened().await.unwrap();
    handle.stats().await.unwrap();

    let sent = fx.transport.transmitted_bytes();
    assert_eq!(sent.len(), 100);
    for producer in 0..4u8 {
        let sequence: Vec<u8> = sent
            .iter()
            .filter(|p| p[0] == producer)
            .map(|p| p[1])
            .collect();
        assert_eq!(sequence, (0..25u8).collect::<Vec<_>>());
    }
    fx.subsystem.stop().await.unwrap();
}
