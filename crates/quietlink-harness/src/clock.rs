//! Manual time sources

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use quietlink_core::{TimeSource, TimeSync, Timestamp};

/// Time source that only moves when told to
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    millis: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicU64::new(start.as_millis()),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.millis.load(Ordering::SeqCst))
    }
}

/// Time-sync collaborator that counts requests and never answers
#[derive(Debug, Default)]
pub struct RecordingTimeSync {
    requests: AtomicUsize,
}

impl RecordingTimeSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sync requests received
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl TimeSync for RecordingTimeSync {
    fn request_sync(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_time_source() {
        let source = ManualTimeSource::new(Timestamp::new(1_000));
        source.advance(250);
        assert_eq!(source.now(), Timestamp::new(1_250));
        source.set(Timestamp::new(10));
        assert_eq!(source.now(), Timestamp::new(10));
    }

    #[test]
    fn test_recording_time_sync() {
        let sync = RecordingTimeSync::new();
        sync.request_sync();
        sync.request_sync();
        assert_eq!(sync.requests(), 2);
    }
}
