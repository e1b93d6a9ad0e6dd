//! Mock Transport for Testing
//!
//! Records every payload handed to it, in order, and can be told to fail
//! upcoming transmissions to exercise the dispatcher's failure paths.

use std::sync::Arc;

use parking_lot::Mutex;
use quietlink_core::{Ack, Payload, Transport, TransportError};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Default)]
struct MockState {
    transmitted: Vec<Payload>,
    /// Number of upcoming transmissions to fail
    fail_next: usize,
    /// Fail everything with `LinkDown` while set
    link_down: bool,
    failures: usize,
}

/// In-memory transport that records transmissions
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    count: Arc<watch::Sender<usize>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            count: Arc::new(count),
        }
    }

    /// Payloads accepted so far, in transmission order
    pub fn transmitted(&self) -> Vec<Payload> {
        self.state.lock().transmitted.clone()
    }

    /// Accepted payloads as raw byte vectors
    pub fn transmitted_bytes(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .transmitted
            .iter()
            .map(|p| p.as_bytes().to_vec())
            .collect()
    }

    /// Number of accepted payloads
    pub fn transmitted_count(&self) -> usize {
        self.state.lock().transmitted.len()
    }

    /// Number of rejected transmissions
    pub fn failure_count(&self) -> usize {
        self.state.lock().failures
    }

    /// Forget recorded transmissions
    pub fn clear(&self) {
        self.state.lock().transmitted.clear();
        self.count.send_replace(0);
    }

    /// Fail the next `n` transmissions with `SendFailed`
    pub fn fail_next(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    /// Fail every transmission with `LinkDown` until cleared
    pub fn set_link_down(&self, down: bool) {
        self.state.lock().link_down = down;
    }

    /// Wait until at least `n` payloads have been accepted
    pub async fn wait_for_transmissions(&self, n: usize) {
        let mut receiver = self.count.subscribe();
        let _ = receiver.wait_for(|count| *count >= n).await;
    }
}

impl Transport for MockTransport {
    fn transmit(&self, payload: &Payload) -> Result<Ack, TransportError> {
        let mut state = self.state.lock();

        if state.link_down {
            state.failures += 1;
            return Err(TransportError::LinkDown);
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            state.failures += 1;
            return Err(TransportError::SendFailed {
                reason: "injected failure".to_string(),
            });
        }

        debug!("Mock transport accepted {}", payload);
        state.transmitted.push(payload.clone());
        let count = state.transmitted.len();
        drop(state);

        self.count.send_replace(count);
        Ok(Ack::for_payload(payload))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let transport = MockTransport::new();
        transport.transmit(&Payload::from("a")).unwrap();
        transport.transmit(&Payload::from("b")).unwrap();

        assert_eq!(transport.transmitted_bytes(), vec![b"a".to_vec(), b"b".to_vec()]);
        transport.clear();
        assert_eq!(transport.transmitted_count(), 0);
    }

    #[test]
    fn test_failure_injection() {
        let transport = MockTransport::new();
        transport.fail_next(1);
        assert!(matches!(
            transport.transmit(&Payload::from("a")),
            Err(TransportError::SendFailed { .. })
        ));
        assert!(transport.transmit(&Payload::from("b")).is_ok());

        transport.set_link_down(true);
        assert_eq!(
            transport.transmit(&Payload::from("c")),
            Err(TransportError::LinkDown)
        );
        assert_eq!(transport.failure_count(), 2);
        assert_eq!(transport.transmitted_count(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_transmissions() {
        let transport = MockTransport::new();
        let waiter = transport.clone();
        let task = tokio::spawn(async move { waiter.wait_for_transmissions(2).await });

        transport.transmit(&Payload::from("a")).unwrap();
        transport.transmit(&Payload::from("b")).unwrap();
        task.await.unwrap();
    }
}
