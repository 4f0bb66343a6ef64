//! File-backed commit log
//!
//! One append-only file per tablespace. Entries are binary-encoded
//! (bincode) with a 4-byte length prefix. A dedicated writer thread
//! batches appends from concurrent callers; fsync policy is
//! configurable:
//!
//! - `fsync_interval_ms == 0` (default): fsync once per batch, so
//!   `log` returns only after the entry is durable. Concurrent writers
//!   still share one fsync per batch.
//! - `fsync_interval_ms > 0`: deferred fsync. `log` returns after the
//!   write reaches the OS buffer; durability arrives at the next
//!   interval, size trigger, or `checkpoint` call.
//!
//! On a batch failure entries form a durable prefix: everything before
//! the first failed frame may be on disk, nothing after it is.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{NodeError, Result};

use super::{now_millis, CommitLog, EntryConsumer, LogEntry, LogManager, LogRecord, Lsn};

/// Fsync and batching policy for the file commit log
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Maximum time to wait while collecting a batch (milliseconds)
    pub batch_timeout_ms: u64,
    /// Maximum number of records in a batch before forcing a write
    pub max_batch_size: usize,
    /// How often to fsync (milliseconds). 0 = fsync per batch.
    pub fsync_interval_ms: u64,
    /// Maximum bytes buffered before forcing an immediate fsync
    pub max_unfsynced_bytes: usize,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            batch_timeout_ms: 2,
            max_batch_size: 128,
            fsync_interval_ms: 0,
            max_unfsynced_bytes: 1 << 20,
        }
    }
}

impl WalConfig {
    /// Deferred fsync preset: higher throughput, durability at the next
    /// interval or checkpoint
    pub fn deferred() -> Self {
        Self {
            fsync_interval_ms: 50,
            ..Default::default()
        }
    }
}

/// Durability latch shared between the writer thread and callers
struct SyncState {
    /// Highest LSN known to be on disk
    durable_lsn: AtomicU64,
    condvar: Condvar,
    mutex: Mutex<()>,
    shutdown: AtomicBool,
}

impl SyncState {
    fn new() -> Self {
        Self {
            durable_lsn: AtomicU64::new(0),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
            shutdown: AtomicBool::new(false),
        }
    }

    fn durable_lsn(&self) -> Lsn {
        self.durable_lsn.load(Ordering::Acquire)
    }

    fn wait_for_durable(&self, target: Lsn, timeout: Duration) -> Result<()> {
        if self.durable_lsn() >= target {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.mutex.lock().expect("sync state lock poisoned");
        loop {
            if self.durable_lsn() >= target {
                return Ok(());
            }
            if self.shutdown.load(Ordering::Acquire) {
                return Err(NodeError::Log("log writer shut down during wait".into()));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NodeError::Log(format!(
                    "timeout waiting for LSN {} to become durable (durable: {})",
                    target,
                    self.durable_lsn()
                )));
            }
            let (g, _) = self
                .condvar
                .wait_timeout(guard, remaining)
                .expect("sync state lock poisoned");
            guard = g;
        }
    }

    /// Advance the durable LSN (monotonic) and wake all waiters
    fn signal_durable(&self, lsn: Lsn) {
        let mut current = self.durable_lsn.load(Ordering::Acquire);
        while lsn > current {
            match self.durable_lsn.compare_exchange_weak(
                current,
                lsn,
                Ordering::Release,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
        self.condvar.notify_all();
    }

    fn reset(&self) {
        self.durable_lsn.store(0, Ordering::Release);
    }

    fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.condvar.notify_all();
    }
}

struct WriteRequest {
    record: LogRecord,
    responder: mpsc::SyncSender<Result<()>>,
}

enum WalMessage {
    Write(WriteRequest),
    /// Force an fsync; responds with the durable LSN
    Sync(mpsc::SyncSender<Result<Lsn>>),
    /// Truncate the log file
    Truncate(mpsc::SyncSender<Result<()>>),
    Shutdown,
}

struct Writer {
    sender: mpsc::SyncSender<WalMessage>,
    handle: JoinHandle<()>,
}

/// Commit log appending to a single file through a dedicated writer thread
pub struct FileCommitLog {
    path: PathBuf,
    config: WalConfig,
    /// Highest LSN assigned so far
    last_lsn: AtomicU64,
    state: Arc<SyncState>,
    writer: Mutex<Option<Writer>>,
    closed: AtomicBool,
}

impl FileCommitLog {
    pub fn new(path: PathBuf, config: WalConfig) -> Self {
        Self {
            path,
            config,
            last_lsn: AtomicU64::new(0),
            state: Arc::new(SyncState::new()),
            writer: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn next_lsn(&self) -> Lsn {
        self.last_lsn.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Read every well-formed record currently in the file. A torn
    /// frame at the tail (partial write before a crash) ends the scan.
    fn read_records(&self) -> Result<Vec<LogRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut file = File::open(&self.path).map_err(log_err)?;
        let mut records = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf) {
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(log_err(e)),
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut record_buf = vec![0u8; len];
            match file.read_exact(&mut record_buf) {
                Ok(_) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    log::warn!("torn record at tail of '{}', stopping scan", self.path.display());
                    break;
                }
                Err(e) => return Err(log_err(e)),
            }
            match bincode::deserialize::<LogRecord>(&record_buf) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::warn!("skipping malformed log record: {}", e);
                }
            }
        }
        Ok(records)
    }

    fn replay(&self, from: Lsn, consumer: &mut EntryConsumer<'_>) -> Result<()> {
        for record in self.read_records()? {
            if record.lsn > from {
                consumer(record.lsn, &record.entry)?;
            }
        }
        Ok(())
    }

    fn send(&self, msg: WalMessage) -> Result<()> {
        let writer = self.writer.lock().expect("writer lock poisoned");
        match writer.as_ref() {
            Some(w) => w
                .sender
                .send(msg)
                .map_err(|e| NodeError::Log(format!("log writer channel closed: {}", e))),
            None => Err(NodeError::Log("log is not writable; call start_writing".into())),
        }
    }
}

fn log_err(e: std::io::Error) -> NodeError {
    NodeError::Log(e.to_string())
}

impl CommitLog for FileCommitLog {
    fn log(&self, entry: LogEntry) -> Result<Lsn> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Log("log is closed".into()));
        }
        let lsn = self.next_lsn();
        let record = LogRecord {
            lsn,
            entry,
            timestamp: now_millis(),
        };
        let (tx, rx) = mpsc::sync_channel(1);
        self.send(WalMessage::Write(WriteRequest { record, responder: tx }))?;
        rx.recv()
            .map_err(|e| NodeError::Log(format!("log write response lost: {}", e)))??;
        Ok(lsn)
    }

    fn log_batch(&self, entries: Vec<LogEntry>) -> Result<Vec<Lsn>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Log("log is closed".into()));
        }
        let mut lsns = Vec::with_capacity(entries.len());
        let mut receivers = Vec::with_capacity(entries.len());
        for entry in entries {
            let lsn = self.next_lsn();
            let record = LogRecord {
                lsn,
                entry,
                timestamp: now_millis(),
            };
            let (tx, rx) = mpsc::sync_channel(1);
            self.send(WalMessage::Write(WriteRequest { record, responder: tx }))?;
            lsns.push(lsn);
            receivers.push(rx);
        }
        for rx in receivers {
            rx.recv()
                .map_err(|e| NodeError::Log(format!("log write response lost: {}", e)))??;
        }
        Ok(lsns)
    }

    fn recover(&self, from: Lsn, consumer: &mut EntryConsumer<'_>, _fencing: bool) -> Result<()> {
        // Single-writer file log: fencing is implicit in file ownership
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Log("log is closed".into()));
        }
        let mut max = self.last_lsn.load(Ordering::SeqCst);
        for record in self.read_records()? {
            max = max.max(record.lsn);
            if record.lsn > from {
                consumer(record.lsn, &record.entry)?;
            }
        }
        // Make sure new appends keep the sequence monotonic
        self.last_lsn.fetch_max(max, Ordering::SeqCst);
        Ok(())
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
        let mut writer = self.writer.lock().expect("writer lock poisoned");
        if writer.is_some() {
            return Ok(());
        }

        // Seed the LSN counter from whatever is already on disk
        let max_on_disk = self
            .read_records()?
            .iter()
            .map(|r| r.lsn)
            .max()
            .unwrap_or(0);
        self.last_lsn.fetch_max(max_on_disk, Ordering::SeqCst);
        self.state.signal_durable(max_on_disk);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(log_err)?;

        let (tx, rx) = mpsc::sync_channel::<WalMessage>(10_000);
        let config = self.config.clone();
        let path = self.path.clone();
        let state = Arc::clone(&self.state);
        let handle = std::thread::spawn(move || {
            wal_writer_thread(file, rx, path, config, state);
        });
        *writer = Some(Writer { sender: tx, handle });
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let running = {
            let writer = self.writer.lock().expect("writer lock poisoned");
            writer.is_some()
        };
        if running {
            let (tx, rx) = mpsc::sync_channel(1);
            self.send(WalMessage::Truncate(tx))?;
            rx.recv()
                .map_err(|e| NodeError::Log(format!("log truncate response lost: {}", e)))??;
        } else if self.path.exists() {
            OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)
                .map_err(log_err)?;
        }
        self.last_lsn.store(0, Ordering::SeqCst);
        self.state.reset();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let writer = {
            let mut writer = self.writer.lock().expect("writer lock poisoned");
            writer.take()
        };
        if let Some(w) = writer {
            let _ = w.sender.send(WalMessage::Shutdown);
            if w.handle.join().is_err() {
                return Err(NodeError::Log("log writer thread panicked".into()));
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn checkpoint(&self) -> Result<()> {
        let running = {
            let writer = self.writer.lock().expect("writer lock poisoned");
            writer.is_some()
        };
        if !running {
            return Ok(());
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.send(WalMessage::Sync(tx))?;
        rx.recv()
            .map_err(|e| NodeError::Log(format!("log sync response lost: {}", e)))??;
        Ok(())
    }
}

impl Drop for FileCommitLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("error closing log '{}': {}", self.path.display(), e);
        }
    }
}

/// Writer thread: batches appends, applies the fsync policy
fn wal_writer_thread(
    mut file: File,
    rx: mpsc::Receiver<WalMessage>,
    path: PathBuf,
    config: WalConfig,
    state: Arc<SyncState>,
) {
    let batch_timeout = Duration::from_millis(config.batch_timeout_ms);
    let sync_per_batch = config.fsync_interval_ms == 0;
    let fsync_interval = Duration::from_millis(config.fsync_interval_ms.max(1));

    let mut last_fsync = Instant::now();
    let mut unfsynced_bytes: usize = 0;
    let mut max_written_lsn: Lsn = 0;

    'outer: loop {
        let mut batch: Vec<WriteRequest> = Vec::new();
        let mut pending_syncs: Vec<mpsc::SyncSender<Result<Lsn>>> = Vec::new();
        let mut pending_truncates: Vec<mpsc::SyncSender<Result<()>>> = Vec::new();
        let mut should_shutdown = false;

        // First message: block indefinitely unless deferred bytes are
        // pending, in which case wake in time for the interval fsync
        let first = if !sync_per_batch && unfsynced_bytes > 0 {
            let until_fsync = fsync_interval.saturating_sub(last_fsync.elapsed());
            match rx.recv_timeout(until_fsync) {
                Ok(msg) => Some(msg),
                Err(mpsc::RecvTimeoutError::Timeout) => None,
                Err(mpsc::RecvTimeoutError::Disconnected) => break 'outer,
            }
        } else {
            match rx.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break 'outer,
            }
        };

        if let Some(msg) = first {
            match msg {
                WalMessage::Write(req) => batch.push(req),
                WalMessage::Sync(r) => pending_syncs.push(r),
                WalMessage::Truncate(r) => pending_truncates.push(r),
                WalMessage::Shutdown => should_shutdown = true,
            }
        }

        // Collect more writes up to the batch window
        let deadline = Instant::now() + batch_timeout;
        while batch.len() < config.max_batch_size && !should_shutdown {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok(WalMessage::Write(req)) => batch.push(req),
                Ok(WalMessage::Sync(r)) => pending_syncs.push(r),
                Ok(WalMessage::Truncate(r)) => pending_truncates.push(r),
                Ok(WalMessage::Shutdown) => should_shutdown = true,
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            let mut records = Vec::with_capacity(batch.len());
            let mut responders = Vec::with_capacity(batch.len());
            for req in batch {
                records.push(req.record);
                responders.push(req.responder);
            }

            match write_frames(&mut file, &records) {
                Ok(bytes) => {
                    unfsynced_bytes += bytes;
                    if let Some(max) = records.iter().map(|r| r.lsn).max() {
                        max_written_lsn = max_written_lsn.max(max);
                    }
                    if sync_per_batch {
                        match file.sync_data() {
                            Ok(()) => {
                                state.signal_durable(max_written_lsn);
                                unfsynced_bytes = 0;
                                last_fsync = Instant::now();
                                for responder in responders {
                                    let _ = responder.send(Ok(()));
                                }
                            }
                            Err(e) => {
                                let msg = Arc::new(e.to_string());
                                for responder in responders {
                                    let _ = responder.send(Err(NodeError::Log(msg.as_ref().clone())));
                                }
                            }
                        }
                    } else {
                        for responder in responders {
                            let _ = responder.send(Ok(()));
                        }
                    }
                }
                Err(e) => {
                    let msg = Arc::new(e.to_string());
                    for responder in responders {
                        let _ = responder.send(Err(NodeError::Log(msg.as_ref().clone())));
                    }
                }
            }
        }

        // Deferred-mode fsync triggers
        let sync_requested = !pending_syncs.is_empty();
        let time_triggered = !sync_per_batch && last_fsync.elapsed() >= fsync_interval;
        let size_triggered = unfsynced_bytes >= config.max_unfsynced_bytes;

        if unfsynced_bytes > 0
            && (time_triggered || size_triggered || sync_requested || !pending_truncates.is_empty() || should_shutdown)
        {
            match file.sync_data() {
                Ok(()) => {
                    state.signal_durable(max_written_lsn);
                    log::debug!(
                        "wal fsync complete at LSN {} ({} bytes)",
                        max_written_lsn,
                        unfsynced_bytes
                    );
                    unfsynced_bytes = 0;
                    last_fsync = Instant::now();
                    for responder in pending_syncs.drain(..) {
                        let _ = responder.send(Ok(state.durable_lsn()));
                    }
                }
                Err(e) => {
                    log::error!("wal fsync failed: {}", e);
                    for responder in pending_syncs.drain(..) {
                        let _ = responder.send(Err(NodeError::Log(e.to_string())));
                    }
                }
            }
        } else {
            for responder in pending_syncs.drain(..) {
                let _ = responder.send(Ok(state.durable_lsn()));
            }
        }

        for responder in pending_truncates {
            let result = truncate_file(&mut file, &path);
            if result.is_ok() {
                max_written_lsn = 0;
                unfsynced_bytes = 0;
                state.reset();
            }
            let _ = responder.send(result);
        }

        if should_shutdown {
            if unfsynced_bytes > 0 {
                if file.sync_data().is_ok() {
                    state.signal_durable(max_written_lsn);
                }
            }
            state.signal_shutdown();
            log::debug!("wal writer for '{}' shutting down", path.display());
            break;
        }
    }
    state.signal_shutdown();
}

/// Append length-prefixed bincode frames. Returns bytes written.
fn write_frames(file: &mut File, records: &[LogRecord]) -> Result<usize> {
    let mut total = 0;
    for record in records {
        let encoded = bincode::serialize(record).map_err(|e| NodeError::Log(e.to_string()))?;
        let len = encoded.len() as u32;
        file.write_all(&len.to_le_bytes()).map_err(log_err)?;
        file.write_all(&encoded).map_err(log_err)?;
        total += 4 + encoded.len();
    }
    file.flush().map_err(log_err)?;
    Ok(total)
}

/// Truncate the log file in place, replacing the open handle
fn truncate_file(file: &mut File, path: &PathBuf) -> Result<()> {
    file.flush().map_err(log_err)?;
    file.sync_all().map_err(log_err)?;
    let new_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(log_err)?;
    *file = new_file;
    Ok(())
}

/// Log manager creating one file-backed log per tablespace under a base
/// directory (`<base>/<tablespace>/wal.log`)
pub struct FileLogManager {
    base_dir: PathBuf,
    config: WalConfig,
}

impl FileLogManager {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            config: WalConfig::default(),
        }
    }

    pub fn with_config(base_dir: PathBuf, config: WalConfig) -> Self {
        Self { base_dir, config }
    }
}

impl LogManager for FileLogManager {
    fn start(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).map_err(log_err)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn create_log(&self, table_space: &str) -> Result<Box<dyn CommitLog>> {
        if table_space.is_empty() || table_space.contains('/') || table_space.contains("..") {
            return Err(NodeError::Log(format!("invalid tablespace name '{}'", table_space)));
        }
        let dir = self.base_dir.join(table_space);
        std::fs::create_dir_all(&dir).map_err(log_err)?;
        Ok(Box::new(FileCommitLog::new(
            dir.join("wal.log"),
            self.config.clone(),
        )))
    }
}
