//! Durable outbound queue
//!
//! Ordered, crash-durable storage for payloads waiting to be transmitted.
//! The file-backed implementation is an append-only log of checksummed
//! records; the in-memory implementation backs tests and path-less configs.
//!
//! Every operation takes the queue-internal lock, so a drain is atomic with
//! respect to concurrent appends and a close never interrupts a drain.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::errors::QueueError;
use crate::types::Payload;

/// Bytes of framing in front of every record: length + crc32
const RECORD_HEADER_LEN: usize = 8;

// ----------------------------------------------------------------------------
// Queue Trait
// ----------------------------------------------------------------------------

/// FIFO store of pending outbound payloads
pub trait DurableQueue: Send + Sync {
    /// Append a payload at the tail; durable before returning
    fn append(&self, payload: Payload) -> Result<(), QueueError>;

    /// Remove and return all entries, oldest first
    fn drain_all(&self) -> Result<Vec<Payload>, QueueError>;

    /// Number of pending entries
    fn len(&self) -> Result<usize, QueueError>;

    /// Whether no entries are pending
    fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }

    /// Release the underlying storage; later operations fail with `Closed`
    fn close(&self) -> Result<(), QueueError>;

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;
}

// ----------------------------------------------------------------------------
// Record Framing
// ----------------------------------------------------------------------------

/// Checksum over the length prefix and the body
///
/// Covering the length means an all-zero header never checks out, so a
/// zero-filled tail cannot parse as a run of empty records.
fn record_checksum(len_bytes: &[u8; 4], body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(len_bytes);
    hasher.update(body);
    hasher.finalize()
}

/// Frame a payload as `[len: u32 LE][crc32(len ++ bytes): u32 LE][bytes]`
fn encode_record(bytes: &[u8]) -> Vec<u8> {
    let len_bytes = (bytes.len() as u32).to_le_bytes();
    let mut record = Vec::with_capacity(RECORD_HEADER_LEN + bytes.len());
    record.extend_from_slice(&len_bytes);
    record.extend_from_slice(&record_checksum(&len_bytes, bytes).to_le_bytes());
    record.extend_from_slice(bytes);
    record
}

/// Outcome of scanning a queue log
#[derive(Debug, Default)]
struct ScanResult {
    payloads: Vec<Payload>,
    /// Length of the prefix made of complete, valid records
    valid_len: u64,
    /// Why scanning stopped early, if it did
    torn: Option<QueueError>,
}

fn scan_records(bytes: &[u8]) -> ScanResult {
    let mut result = ScanResult::default();
    let mut cursor = 0usize;

    while cursor < bytes.len() {
        let offset = cursor as u64;
        if cursor + RECORD_HEADER_LEN > bytes.len() {
            result.torn = Some(QueueError::corrupt(offset, "truncated record header"));
            break;
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[cursor..cursor + 4]);
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&bytes[cursor + 4..cursor + RECORD_HEADER_LEN]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let crc = u32::from_le_bytes(crc_bytes);

        let start = cursor + RECORD_HEADER_LEN;
        if start + len > bytes.len() {
            result.torn = Some(QueueError::corrupt(offset, "truncated record body"));
            break;
        }

        let body = &bytes[start..start + len];
        if record_checksum(&len_bytes, body) != crc {
            result.torn = Some(QueueError::corrupt(offset, "checksum mismatch"));
            break;
        }

        result.payloads.push(Payload::new(body.to_vec()));
        cursor = start + len;
        result.valid_len = cursor as u64;
    }

    result
}

// ----------------------------------------------------------------------------
// File Queue Implementation
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct LogFile {
    file: File,
    /// Number of records in the log
    len: usize,
    /// Byte offset of the end of the last complete record
    end_offset: u64,
}

impl LogFile {
    fn read_all(&mut self) -> Result<Vec<u8>, QueueError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::with_capacity(self.end_offset as usize);
        self.file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn truncate_to(&mut self, offset: u64) -> Result<(), QueueError> {
        self.file.set_len(offset)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.end_offset = offset;
        Ok(())
    }
}

/// Append-only log file queue
#[derive(Debug)]
pub struct FileQueue {
    path: PathBuf,
    sync_on_append: bool,
    max_payload_size: usize,
    log: Mutex<Option<LogFile>>,
}

impl FileQueue {
    /// Open (or create) the queue log at `path`
    ///
    /// A torn tail left by an unclean shutdown is truncated away; every
    /// complete record in front of it is kept.
    pub fn open<P: AsRef<Path>>(path: P, config: &QueueConfig) -> Result<Self, QueueError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let scan = scan_records(&bytes);

        let mut log = LogFile {
            file,
            len: scan.payloads.len(),
            end_offset: scan.valid_len,
        };

        if let Some(reason) = scan.torn {
            warn!(
                "Queue log {} has a torn tail ({}); truncating {} bytes",
                path.display(),
                reason,
                bytes.len() as u64 - scan.valid_len
            );
            log.truncate_to(scan.valid_len)?;
            log.file.sync_all()?;
        } else {
            log.file.seek(SeekFrom::Start(scan.valid_len))?;
        }

        if log.len > 0 {
            info!(
                "Opened queue log {} with {} pending payloads",
                path.display(),
                log.len
            );
        } else {
            debug!("Opened empty queue log {}", path.display());
        }

        Ok(Self {
            path,
            sync_on_append: config.sync_on_append,
            max_payload_size: config.max_payload_size,
            log: Mutex::new(Some(log)),
        })
    }

    /// Path of the underlying log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all pending payloads without removing them
    pub fn peek_all(&self) -> Result<Vec<Payload>, QueueError> {
        let mut guard = self.log.lock();
        let log = guard.as_mut().ok_or(QueueError::Closed)?;
        let bytes = log.read_all()?;
        log.file.seek(SeekFrom::Start(log.end_offset))?;
        let end = (log.end_offset as usize).min(bytes.len());
        Ok(scan_records(&bytes[..end]).payloads)
    }

    /// Drain the log, persisting the emptied file with `sync`
    ///
    /// Once the file is truncated the records live only in the returned
    /// vector, so a failed sync is logged rather than returned.
    fn drain_with<F>(&self, sync: F) -> Result<Vec<Payload>, QueueError>
    where
        F: FnOnce(&File) -> std::io::Result<()>,
    {
        let mut guard = self.log.lock();
        let log = guard.as_mut().ok_or(QueueError::Closed)?;

        if log.len == 0 {
            return Ok(Vec::new());
        }

        let bytes = log.read_all()?;
        let end = (log.end_offset as usize).min(bytes.len());
        let scan = scan_records(&bytes[..end]);
        if let Some(reason) = scan.torn {
            warn!(
                "Queue log {} corrupted while pending ({}); draining {} intact payloads",
                self.path.display(),
                reason,
                scan.payloads.len()
            );
        }

        log.truncate_to(0)?;
        log.len = 0;
        if let Err(e) = sync(&log.file) {
            warn!(
                "Failed to sync drained queue log {}: {}",
                self.path.display(),
                e
            );
        }

        debug!("Drained {} payloads from {}", scan.payloads.len(), self.path.display());
        Ok(scan.payloads)
    }
}

impl DurableQueue for FileQueue {
    fn append(&self, payload: Payload) -> Result<(), QueueError> {
        if payload.len() > self.max_payload_size {
            return Err(QueueError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }

        let mut guard = self.log.lock();
        let log = guard.as_mut().ok_or(QueueError::Closed)?;

        let record = encode_record(payload.as_bytes());
        let written = log.file.write_all(&record).and_then(|_| {
            if self.sync_on_append {
                log.file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            // Drop whatever part of the record reached the file
            let end = log.end_offset;
            if let Err(rollback) = log.truncate_to(end) {
                warn!("Failed to roll back partial queue append: {}", rollback);
            }
            return Err(QueueError::Io(e));
        }

        log.end_offset += record.len() as u64;
        log.len += 1;
        Ok(())
    }

    fn drain_all(&self) -> Result<Vec<Payload>, QueueError> {
        self.drain_with(|file| file.sync_all())
    }

    fn len(&self) -> Result<usize, QueueError> {
        let guard = self.log.lock();
        guard.as_ref().map(|log| log.len).ok_or(QueueError::Closed)
    }

    fn close(&self) -> Result<(), QueueError> {
        let mut guard = self.log.lock();
        let log = guard.take().ok_or(QueueError::Closed)?;
        log.file.sync_all()?;
        info!("Closed queue log {} ({} pending)", self.path.display(), log.len);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.log.lock().is_none()
    }
}

// ----------------------------------------------------------------------------
// Memory Queue Implementation
// ----------------------------------------------------------------------------

/// In-memory queue for testing and path-less configurations
#[derive(Debug)]
pub struct MemoryQueue {
    max_payload_size: usize,
    entries: Mutex<Option<VecDeque<Payload>>>,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryQueue {
    /// Create a new memory queue with default limits
    pub fn new() -> Self {
        Self::with_config(&QueueConfig::default())
    }

    /// Create with specific limits (the path is ignored)
    pub fn with_config(config: &QueueConfig) -> Self {
        Self {
            max_payload_size: config.max_payload_size,
            entries: Mutex::new(Some(VecDeque::new())),
        }
    }
}

impl DurableQueue for MemoryQueue {
    fn append(&self, payload: Payload) -> Result<(), QueueError> {
        if payload.len() > self.max_payload_size {
            return Err(QueueError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }
        let mut guard = self.entries.lock();
        guard.as_mut().ok_or(QueueError::Closed)?.push_back(payload);
        Ok(())
    }

    fn drain_all(&self) -> Result<Vec<Payload>, QueueError> {
        let mut guard = self.entries.lock();
        let entries = guard.as_mut().ok_or(QueueError::Closed)?;
        Ok(entries.drain(..).collect())
    }

    fn len(&self) -> Result<usize, QueueError> {
        let guard = self.entries.lock();
        guard.as_ref().map(VecDeque::len).ok_or(QueueError::Closed)
    }

    fn close(&self) -> Result<(), QueueError> {
        self.entries.lock().take().map(|_| ()).ok_or(QueueError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.entries.lock().is_none()
    }
}

// ----------------------------------------------------------------------------
// Factory Functions
// ----------------------------------------------------------------------------

/// Open the queue described by `config`
pub fn open_queue(config: &QueueConfig) -> Result<Arc<dyn DurableQueue>, QueueError> {
    match &config.path {
        Some(path) => Ok(Arc::new(FileQueue::open(path, config)?)),
        None => Ok(Arc::new(MemoryQueue::with_config(config))),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
