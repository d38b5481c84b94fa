//! Relay store: the single-slot home of the latest frame.
//!
//! DESIGN
//! ======
//! Exactly one `FrameRecord` is kept. Every `put` serializes the whole record
//! and replaces the slot, so the last writer wins regardless of timestamps.
//! Staleness is never enforced by deletion: `get_fresh` compares the stored
//! client timestamp against the clock on each read and reports stale data
//! as absent while the bytes stay in storage.
//!
//! The clock and the storage medium are injected so tests can move time and
//! simulate write failures without touching the filesystem.
//!
//! ERROR HANDLING
//! ==============
//! Only writes fail. A load error or bytes that do not parse as a record are
//! logged and treated as "no record", which also covers a reader racing a
//! writer on a medium without atomic replace.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Default freshness window in seconds.
pub const DEFAULT_MAX_FRAME_AGE_SECS: i64 = 10;

// =============================================================================
// RECORD
// =============================================================================

/// The persisted frame. Field names on disk are `{stream_id, frame, timestamp, server_time}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub stream_id: String,
    /// Opaque payload; never inspected.
    pub frame: serde_json::Value,
    #[serde(rename = "timestamp")]
    pub client_timestamp: i64,
    #[serde(rename = "server_time")]
    pub server_receive_time: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to encode frame record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write frame record: {0}")]
    Write(#[from] io::Error),
}

/// Freshness predicate: `now - client_timestamp <= max_age`.
#[must_use]
pub fn is_fresh(client_timestamp: i64, now: i64, max_age: i64) -> bool {
    now.saturating_sub(client_timestamp) <= max_age
}

// =============================================================================
// CLOCK
// =============================================================================

/// Source of "now" in whole Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }
}

// =============================================================================
// STORAGE
// =============================================================================

/// Whole-record byte slot. Implementations replace the slot in one step.
pub trait FrameStorage: Send + Sync {
    /// Read the slot. `Ok(None)` when nothing has ever been written.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the slot exists but cannot be read.
    fn load(&self) -> io::Result<Option<Vec<u8>>>;

    /// Replace the slot with `bytes`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; the previous contents must survive it.
    fn save(&self, bytes: &[u8]) -> io::Result<()>;
}

/// One JSON file on disk.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Directory holding the record file; temp files are created there so the rename stays on one filesystem.
    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl FrameStorage for FileStorage {
    fn load(&self) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, bytes: &[u8]) -> io::Result<()> {
        // Each write gets its own temp file, renamed over the target: readers see old or new, never half.
        let mut tmp = NamedTempFile::new_in(self.dir())?;
        tmp.write_all(bytes)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// In-process slot. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<Vec<u8>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameStorage for MemoryStorage {
    fn load(&self) -> io::Result<Option<Vec<u8>>> {
        let slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(slot.clone())
    }

    fn save(&self, bytes: &[u8]) -> io::Result<()> {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(bytes.to_vec());
        Ok(())
    }
}

// =============================================================================
// RELAY STORE
// =============================================================================

/// Owned single-slot store. Clone is cheap; clones share the same slot.
#[derive(Clone)]
pub struct RelayStore {
    storage: Arc<dyn FrameStorage>,
    clock: Arc<dyn Clock>,
    max_frame_age: i64,
}

impl RelayStore {
    #[must_use]
    pub fn new(storage: Arc<dyn FrameStorage>, clock: Arc<dyn Clock>, max_frame_age: i64) -> Self {
        Self { storage, clock, max_frame_age }
    }

    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Store a new record, replacing whatever was there.
    ///
    /// A missing `client_timestamp` defaults to the server's receive time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the record cannot be encoded or written. The
    /// previously stored record is left untouched in that case.
    pub fn put(
        &self,
        stream_id: impl Into<String>,
        frame: serde_json::Value,
        client_timestamp: Option<i64>,
    ) -> Result<FrameRecord, StoreError> {
        let now = self.clock.now();
        let record = FrameRecord {
            stream_id: stream_id.into(),
            frame,
            client_timestamp: client_timestamp.unwrap_or(now),
            server_receive_time: now,
        };
        let bytes = serde_json::to_vec(&record)?;
        self.storage.save(&bytes)?;
        debug!(stream_id = %record.stream_id, timestamp = record.client_timestamp, bytes = bytes.len(), "frame stored");
        Ok(record)
    }

    /// The stored record if one exists, parses, and is within the freshness window.
    #[must_use]
    pub fn get_fresh(&self) -> Option<FrameRecord> {
        self.get_fresh_at(self.clock.now())
    }

    /// [`get_fresh`](Self::get_fresh) judged against a caller-supplied `now`, so
    /// one clock reading can back both the verdict and a reported server time.
    #[must_use]
    pub fn get_fresh_at(&self, now: i64) -> Option<FrameRecord> {
        let bytes = match self.storage.load() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "frame record load failed");
                return None;
            }
        };

        let record: FrameRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "stored frame record is unreadable");
                return None;
            }
        };

        is_fresh(record.client_timestamp, now, self.max_frame_age).then_some(record)
    }
}


#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
