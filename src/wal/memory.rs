//! In-memory commit log
//!
//! Keeps entries in a plain vector. Used by tests and by single-process
//! deployments that accept losing the log on restart.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{NodeError, Result};

use super::{now_millis, CommitLog, EntryConsumer, LogEntry, LogManager, LogRecord, Lsn};

/// Commit log backed by process memory
#[derive(Default)]
pub struct MemoryCommitLog {
    records: Mutex<Vec<LogRecord>>,
    /// Highest LSN assigned so far
    last_lsn: AtomicU64,
    writable: AtomicBool,
    closed: AtomicBool,
}

impl MemoryCommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_writable(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Log("log is closed".into()));
        }
        if !self.writable.load(Ordering::Acquire) {
            return Err(NodeError::Log("log is not writable; call start_writing".into()));
        }
        Ok(())
    }

    fn replay(&self, from: Lsn, consumer: &mut EntryConsumer<'_>) -> Result<()> {
        // Clone under the lock so the consumer runs without holding it
        let records: Vec<LogRecord> = {
            let records = self.records.lock().expect("log lock poisoned");
            records.iter().filter(|r| r.lsn > from).cloned().collect()
        };
        for record in records {
            consumer(record.lsn, &record.entry)?;
        }
        Ok(())
    }
}

impl CommitLog for MemoryCommitLog {
    fn log(&self, entry: LogEntry) -> Result<Lsn> {
        self.check_writable()?;
        let mut records = self.records.lock().expect("log lock poisoned");
        let lsn = self.last_lsn.fetch_add(1, Ordering::SeqCst) + 1;
        records.push(LogRecord {
            lsn,
            entry,
            timestamp: now_millis(),
        });
        Ok(lsn)
    }

    /// Batch append. All-or-nothing: the lock is held across the whole
    /// batch, so either every entry is appended or none is.
    fn log_batch(&self, entries: Vec<LogEntry>) -> Result<Vec<Lsn>> {
        self.check_writable()?;
        let mut records = self.records.lock().expect("log lock poisoned");
        let mut lsns = Vec::with_capacity(entries.len());
        for entry in entries {
            let lsn = self.last_lsn.fetch_add(1, Ordering::SeqCst) + 1;
            records.push(LogRecord {
                lsn,
                entry,
                timestamp: now_millis(),
            });
            lsns.push(lsn);
        }
        Ok(lsns)
    }

    fn recover(&self, from: Lsn, consumer: &mut EntryConsumer<'_>, _fencing: bool) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Log("log is closed".into()));
        }
        self.replay(from, consumer)
    }

    fn follow(&self, from: Lsn, consumer: &mut EntryConsumer<'_>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Log("log is closed".into()));
        }
        self.replay(from, consumer)
    }

    fn current_lsn(&self) -> Lsn {
        self.last_lsn.load(Ordering::SeqCst)
    }

    fn start_writing(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Log("log is closed".into()));
        }
        self.writable.store(true, Ordering::Release);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut records = self.records.lock().expect("log lock poisoned");
        records.clear();
        self.last_lsn.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.writable.store(false, Ordering::Release);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn checkpoint(&self) -> Result<()> {
        // Nothing to sync
        Ok(())
    }
}

/// Log manager handing out fresh in-memory logs
#[derive(Default)]
pub struct MemoryLogManager;

impl MemoryLogManager {
    pub fn new() -> Self {
        Self
    }
}

impl LogManager for MemoryLogManager {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn create_log(&self, _table_space: &str) -> Result<Box<dyn CommitLog>> {
        Ok(Box::new(MemoryCommitLog::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_assigns_monotonic_lsns() {
        let log = MemoryCommitLog::new();
        log.start_writing().unwrap();

        let a = log.log(LogEntry::Checkpoint).unwrap();
        let b = log.log(LogEntry::Checkpoint).unwrap();
        assert!(b > a);
        assert_eq!(log.current_lsn(), b);
    }

    #[test]
    fn test_log_requires_start_writing() {
        let log = MemoryCommitLog::new();
        assert!(log.log(LogEntry::Checkpoint).is_err());
        log.start_writing().unwrap();
        assert!(log.log(LogEntry::Checkpoint).is_ok());
    }

    #[test]
    fn test_log_batch_is_contiguous() {
        let log = MemoryCommitLog::new();
        log.start_writing().unwrap();

        let lsns = log
            .log_batch(vec![LogEntry::Checkpoint, LogEntry::Checkpoint, LogEntry::Checkpoint])
            .unwrap();
        assert_eq!(lsns, vec![1, 2, 3]);
    }

    #[test]
    fn test_recover_replays_after_lsn() {
        let log = MemoryCommitLog::new();
        log.start_writing().unwrap();
        log.log(LogEntry::CreateTable { table: "users".into() }).unwrap();
        log.log(LogEntry::Checkpoint).unwrap();
        log.log(LogEntry::DropTable { table: "users".into() }).unwrap();

        let mut seen = Vec::new();
        log.recover(2, &mut |lsn, entry| {
            seen.push((lsn, entry.clone()));
            Ok(())
        }, true)
        .unwrap();

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 3);
    }

    #[test]
    fn test_clear_resets_lsn() {
        let log = MemoryCommitLog::new();
        log.start_writing().unwrap();
        log.log(LogEntry::Checkpoint).unwrap();
        log.clear().unwrap();
        assert_eq!(log.current_lsn(), 0);

        let mut count = 0;
        log.recover(0, &mut |_, _| { count += 1; Ok(()) }, false).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_closed_log_rejects_everything() {
        let log = MemoryCommitLog::new();
        log.start_writing().unwrap();
        log.close().unwrap();
        assert!(log.is_closed());
        assert!(log.log(LogEntry::Checkpoint).is_err());
        assert!(log.recover(0, &mut |_, _| Ok(()), false).is_err());
    }
}
