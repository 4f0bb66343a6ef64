//! Per-tablespace durable log
//!
//! Every tablespace owns exactly one commit log. The log assigns a
//! monotonic sequence number to each persisted entry; recovery replays
//! entries after a checkpoint LSN in order. Log managers hand out one
//! log instance per tablespace and are shared by the whole node.

pub mod file;
pub mod memory;

pub use file::{FileCommitLog, FileLogManager, WalConfig};
pub use memory::{MemoryCommitLog, MemoryLogManager};

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::RawKey;
use crate::error::Result;

/// Log Sequence Number - unique identifier for each persisted entry
pub type Lsn = u64;

/// Current time in Unix epoch milliseconds
pub(crate) fn now_millis() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(dur) => dur.as_millis() as u64,
        Err(_) => 0,
    }
}

/// An entry submitted to the log. The LSN is assigned by the log itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Table created in the owning tablespace
    CreateTable { table: String },
    /// Table dropped
    DropTable { table: String },
    /// Record inserted
    Insert { table: String, key: RawKey, value: Bytes },
    /// Record overwritten
    Update { table: String, key: RawKey, value: Bytes },
    /// Record deleted
    Delete { table: String, key: RawKey },
    /// Checkpoint marker
    Checkpoint,
}

/// A persisted entry: the LSN the log assigned plus the entry payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub entry: LogEntry,
    /// Timestamp (Unix epoch millis)
    pub timestamp: u64,
}

/// Consumer invoked for each replayed entry during recovery
pub type EntryConsumer<'a> = dyn FnMut(Lsn, &LogEntry) -> Result<()> + 'a;

/// The write-ahead log owned by one tablespace manager.
///
/// Entries become durable in LSN order: when an LSN is durable, every
/// lower LSN is durable too. On a batch failure the set of persisted
/// entries is implementation-defined; see each implementation.
pub trait CommitLog: Send + Sync {
    /// Append one entry and return its LSN
    fn log(&self, entry: LogEntry) -> Result<Lsn>;

    /// Append a batch of entries and return their LSNs
    fn log_batch(&self, entries: Vec<LogEntry>) -> Result<Vec<Lsn>>;

    /// Replay entries with LSN strictly greater than `from`, in order.
    ///
    /// `fencing` requests that no competing writer can append after this
    /// recovery; single-writer implementations treat it as a no-op.
    fn recover(&self, from: Lsn, consumer: &mut EntryConsumer<'_>, fencing: bool) -> Result<()>;

    /// Deliver entries with LSN strictly greater than `from` that are
    /// already available, without taking write ownership
    fn follow(&self, from: Lsn, consumer: &mut EntryConsumer<'_>) -> Result<()>;

    /// Highest LSN assigned so far (0 if none)
    fn current_lsn(&self) -> Lsn;

    /// Take write ownership; must be called before the first `log`
    fn start_writing(&self) -> Result<()>;

    /// Discard all entries and reset the LSN counter
    fn clear(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// Force everything appended so far to durable storage
    fn checkpoint(&self) -> Result<()>;
}

/// Shared factory for per-tablespace logs.
///
/// The node holds one log manager; each booted tablespace receives its
/// own [`CommitLog`] instance and owns it exclusively.
pub trait LogManager: Send + Sync {
    fn start(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    /// Create (or reopen) the log for a tablespace
    fn create_log(&self, table_space: &str) -> Result<Box<dyn CommitLog>>;
}
