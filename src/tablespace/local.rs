//! Local tablespace executor
//!
//! Executes statements for one tablespace on the leader node. Rows live
//! in memory as `BTreeMap<RawKey, Bytes>` per table; every mutation is
//! appended to the tablespace's own commit log before it is applied.
//! Checkpoints write each dirty table as one full snapshot page and
//! record the table catalog; on boot the manager reloads the snapshot
//! pages and replays the log from the checkpoint LSN.
//!
//! A failed WAL append poisons the manager: `is_failed` turns true and
//! stays true until the activator evicts it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use bytes::Bytes;

use crate::codec::RawKey;
use crate::error::{NodeError, Result};
use crate::metadata::TableSpaceDescriptor;
use crate::statement::{
    DdlResult, DmlResult, GetResult, Statement, StatementBody, StatementResult, NO_TRANSACTION,
};
use crate::storage::{Record, Table};
use crate::wal::{CommitLog, LogEntry, Lsn};

use super::{NodeRuntime, TableManager, TableSpaceFactory, TableSpaceManager};

/// Mutations between automatic background checkpoints
const AUTO_FLUSH_STATEMENTS: u64 = 1024;

/// One table: rows plus checkpoint bookkeeping
pub struct LocalTableManager {
    name: String,
    created_lsn: Lsn,
    /// Page id of the last full snapshot (0 = none yet)
    snapshot_page: AtomicU64,
    rows: RwLock<BTreeMap<RawKey, Bytes>>,
    /// Mutated since the last snapshot page was written
    dirty: AtomicBool,
}

impl LocalTableManager {
    fn new(name: String, created_lsn: Lsn) -> Self {
        Self {
            name,
            created_lsn,
            snapshot_page: AtomicU64::new(0),
            rows: RwLock::new(BTreeMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    fn restore(&self, records: Vec<Record>) {
        let mut rows = self.rows.write().expect("table lock poisoned");
        for record in records {
            rows.insert(record.key, record.value);
        }
    }

    fn snapshot_page(&self) -> Option<u64> {
        match self.snapshot_page.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }
}

impl TableManager for LocalTableManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn created_lsn(&self) -> Lsn {
        self.created_lsn
    }

    fn record_count(&self) -> usize {
        self.rows.read().expect("table lock poisoned").len()
    }
}

/// Executor for one tablespace, owning its commit log
pub struct LocalTableSpaceManager {
    name: String,
    leader: bool,
    runtime: Arc<NodeRuntime>,
    log: Box<dyn CommitLog>,
    tables: RwLock<BTreeMap<String, Arc<LocalTableManager>>>,
    failed: AtomicBool,
    closed: AtomicBool,
    mutations: AtomicU64,
    /// Set by the factory right after construction; used to hand weak
    /// handles to background tasks
    self_ref: Mutex<Weak<LocalTableSpaceManager>>,
}

impl LocalTableSpaceManager {
    pub fn new(
        descriptor: &TableSpaceDescriptor,
        log: Box<dyn CommitLog>,
        runtime: Arc<NodeRuntime>,
    ) -> Self {
        let leader = descriptor.leader == runtime.node_id();
        Self {
            name: descriptor.name.clone(),
            leader,
            runtime,
            log,
            tables: RwLock::new(BTreeMap::new()),
            failed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            mutations: AtomicU64::new(0),
            self_ref: Mutex::new(Weak::new()),
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Execution(format!(
                "tablespace '{}' is closed",
                self.name
            )));
        }
        if self.failed.load(Ordering::Acquire) {
            return Err(NodeError::Execution(format!(
                "tablespace '{}' has failed and is awaiting eviction",
                self.name
            )));
        }
        Ok(())
    }

    fn require_leader(&self) -> Result<()> {
        if !self.leader {
            return Err(NodeError::Execution(format!(
                "tablespace '{}' is not led by this node",
                self.name
            )));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<Arc<LocalTableManager>> {
        let tables = self.tables.read().expect("tablespace lock poisoned");
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| NodeError::table_not_found(name))
    }

    /// Append to the WAL; a failure here poisons the whole tablespace
    fn append(&self, entry: LogEntry) -> Result<Lsn> {
        match self.log.log(entry) {
            Ok(lsn) => Ok(lsn),
            Err(e) => {
                self.failed.store(true, Ordering::Release);
                log::error!("tablespace '{}' WAL append failed: {}", self.name, e);
                Err(e)
            }
        }
    }

    /// Apply one replayed entry. Idempotent: replaying an entry that is
    /// already reflected in a snapshot page is harmless.
    fn apply_entry(&self, lsn: Lsn, entry: &LogEntry) -> Result<()> {
        match entry {
            LogEntry::CreateTable { table } => {
                let mut tables = self.tables.write().expect("tablespace lock poisoned");
                tables
                    .entry(table.clone())
                    .or_insert_with(|| Arc::new(LocalTableManager::new(table.clone(), lsn)));
            }
            LogEntry::DropTable { table } => {
                let mut tables = self.tables.write().expect("tablespace lock poisoned");
                tables.remove(table);
            }
            LogEntry::Insert { table, key, value } | LogEntry::Update { table, key, value } => {
                match self.table(table) {
                    Ok(tm) => {
                        let mut rows = tm.rows.write().expect("table lock poisoned");
                        rows.insert(key.clone(), value.clone());
                        tm.dirty.store(true, Ordering::Release);
                    }
                    // Entry for a table dropped later in the log
                    Err(_) => log::debug!(
                        "skipping replayed entry at LSN {} for unknown table '{}'",
                        lsn,
                        table
                    ),
                }
            }
            LogEntry::Delete { table, key } => match self.table(table) {
                Ok(tm) => {
                    let mut rows = tm.rows.write().expect("table lock poisoned");
                    rows.remove(key);
                    tm.dirty.store(true, Ordering::Release);
                }
                Err(_) => log::debug!(
                    "skipping replayed delete at LSN {} for unknown table '{}'",
                    lsn,
                    table
                ),
            },
            LogEntry::Checkpoint => {}
        }
        Ok(())
    }

    fn tables_catalog(&self) -> Vec<Table> {
        let tables = self.tables.read().expect("tablespace lock poisoned");
        tables
            .values()
            .map(|tm| Table {
                name: tm.name.clone(),
                created_lsn: tm.created_lsn,
                snapshot_page: tm.snapshot_page(),
            })
            .collect()
    }

    fn persist_catalog(&self, lsn: Lsn) -> Result<()> {
        self.runtime
            .page_store()
            .write_tables(&self.name, lsn, &self.tables_catalog())
    }

    /// Count a mutation; every `AUTO_FLUSH_STATEMENTS` mutations, hand
    /// a checkpoint to the worker pool
    fn maybe_auto_flush(&self) {
        let n = self.mutations.fetch_add(1, Ordering::Relaxed) + 1;
        if n % AUTO_FLUSH_STATEMENTS != 0 {
            return;
        }
        let weak = self
            .self_ref
            .lock()
            .expect("self ref lock poisoned")
            .clone();
        let name = self.name.clone();
        self.runtime.submit("tablespace-checkpoint", move || {
            if let Some(manager) = weak.upgrade() {
                if let Err(e) = manager.flush() {
                    log::error!("background checkpoint of tablespace '{}' failed: {}", name, e);
                }
            }
        });
    }

    fn reject_transaction(&self, stmt: &Statement) -> Result<()> {
        if stmt.transaction_id != NO_TRANSACTION {
            return Err(NodeError::Execution(format!(
                "unknown transaction {} on tablespace '{}'",
                stmt.transaction_id, self.name
            )));
        }
        Ok(())
    }
}

impl TableSpaceManager for LocalTableSpaceManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<()> {
        let pages = self.runtime.page_store();
        let checkpoint = pages.last_checkpoint_lsn(&self.name);

        let stored = pages.load_tables(checkpoint, &self.name)?;
        {
            let mut tables = self.tables.write().expect("tablespace lock poisoned");
            for table in stored {
                let manager = Arc::new(LocalTableManager::new(table.name.clone(), table.created_lsn));
                if let Some(page_id) = table.snapshot_page {
                    let records = pages.load_page(&self.name, &table.name, page_id)?;
                    manager.restore(records);
                    manager.snapshot_page.store(page_id, Ordering::Release);
                }
                tables.insert(table.name.clone(), manager);
            }
        }

        self.log
            .recover(checkpoint, &mut |lsn, entry| self.apply_entry(lsn, entry), true)?;

        if self.leader {
            self.log.start_writing()?;
        }

        log::info!(
            "tablespace '{}' started (leader: {}, checkpoint LSN: {}, tables: {})",
            self.name,
            self.leader,
            checkpoint,
            self.tables.read().expect("tablespace lock poisoned").len()
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        log::info!("closing tablespace '{}'", self.name);
        self.log.close()
    }

    fn execute_statement(&self, stmt: &Statement) -> Result<StatementResult> {
        self.check_alive()?;
        self.reject_transaction(stmt)?;

        match &stmt.body {
            StatementBody::CreateTableSpace { .. } => Err(NodeError::InvalidStatement(
                "CREATE TABLESPACE must be executed by the node manager".into(),
            )),
            StatementBody::CreateTable { table } => {
                self.require_leader()?;
                {
                    let tables = self.tables.read().expect("tablespace lock poisoned");
                    if tables.contains_key(table) {
                        return Err(NodeError::already_exists("Table", table));
                    }
                }
                let entry = LogEntry::CreateTable { table: table.clone() };
                let lsn = self.append(entry.clone())?;
                self.apply_entry(lsn, &entry)?;
                self.persist_catalog(lsn)?;
                Ok(StatementResult::Ddl(DdlResult {
                    transaction_id: stmt.transaction_id,
                }))
            }
            StatementBody::DropTable { table } => {
                self.require_leader()?;
                {
                    let tables = self.tables.read().expect("tablespace lock poisoned");
                    if !tables.contains_key(table) {
                        return Err(NodeError::Ddl(format!("Table '{}' doesn't exist", table)));
                    }
                }
                let entry = LogEntry::DropTable { table: table.clone() };
                let lsn = self.append(entry.clone())?;
                self.apply_entry(lsn, &entry)?;
                self.persist_catalog(lsn)?;
                Ok(StatementResult::Ddl(DdlResult {
                    transaction_id: stmt.transaction_id,
                }))
            }
            StatementBody::Insert { table, key, value } => {
                self.require_leader()?;
                let tm = self.table(table)?;
                let mut rows = tm.rows.write().expect("table lock poisoned");
                if rows.contains_key(key) {
                    return Err(NodeError::Execution(format!(
                        "duplicate key in table '{}'",
                        table
                    )));
                }
                self.append(LogEntry::Insert {
                    table: table.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })?;
                rows.insert(key.clone(), value.clone());
                tm.dirty.store(true, Ordering::Release);
                drop(rows);
                self.maybe_auto_flush();
                Ok(StatementResult::Dml(DmlResult {
                    update_count: 1,
                    key: Some(key.clone()),
                }))
            }
            StatementBody::Update { table, key, value } => {
                self.require_leader()?;
                let tm = self.table(table)?;
                let mut rows = tm.rows.write().expect("table lock poisoned");
                if !rows.contains_key(key) {
                    return Ok(StatementResult::Dml(DmlResult {
                        update_count: 0,
                        key: None,
                    }));
                }
                self.append(LogEntry::Update {
                    table: table.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })?;
                rows.insert(key.clone(), value.clone());
                tm.dirty.store(true, Ordering::Release);
                drop(rows);
                self.maybe_auto_flush();
                Ok(StatementResult::Dml(DmlResult {
                    update_count: 1,
                    key: Some(key.clone()),
                }))
            }
            StatementBody::Delete { table, key } => {
                self.require_leader()?;
                let tm = self.table(table)?;
                let mut rows = tm.rows.write().expect("table lock poisoned");
                if !rows.contains_key(key) {
                    return Ok(StatementResult::Dml(DmlResult {
                        update_count: 0,
                        key: None,
                    }));
                }
                self.append(LogEntry::Delete {
                    table: table.clone(),
                    key: key.clone(),
                })?;
                rows.remove(key);
                tm.dirty.store(true, Ordering::Release);
                drop(rows);
                self.maybe_auto_flush();
                Ok(StatementResult::Dml(DmlResult {
                    update_count: 1,
                    key: Some(key.clone()),
                }))
            }
            StatementBody::Get { table, key } => {
                let tm = self.table(table)?;
                let rows = tm.rows.read().expect("table lock poisoned");
                let record = rows
                    .get(key)
                    .map(|value| Record::new(key.clone(), value.clone()));
                Ok(StatementResult::Get(GetResult { record }))
            }
        }
    }

    fn flush(&self) -> Result<()> {
        self.check_alive()?;
        if !self.leader {
            return Ok(());
        }

        // LSN captured before the snapshot: entries logged while pages
        // are being written will be replayed on recovery, and replay is
        // idempotent
        let checkpoint_lsn = self.log.current_lsn();
        let tables: Vec<Arc<LocalTableManager>> = {
            let tables = self.tables.read().expect("tablespace lock poisoned");
            tables.values().cloned().collect()
        };

        let pages = self.runtime.page_store();
        for tm in &tables {
            if !tm.dirty.swap(false, Ordering::AcqRel) {
                continue;
            }
            let records: Vec<Record> = {
                let rows = tm.rows.read().expect("table lock poisoned");
                rows.iter()
                    .map(|(k, v)| Record::new(k.clone(), v.clone()))
                    .collect()
            };
            match pages.write_page(&self.name, &tm.name, checkpoint_lsn, &records) {
                Ok(page_id) => tm.snapshot_page.store(page_id, Ordering::Release),
                Err(e) => {
                    tm.dirty.store(true, Ordering::Release);
                    return Err(e);
                }
            }
        }

        self.persist_catalog(checkpoint_lsn)?;
        self.log.checkpoint()?;
        log::debug!(
            "tablespace '{}' checkpoint complete at LSN {}",
            self.name,
            checkpoint_lsn
        );
        Ok(())
    }

    fn is_leader(&self) -> bool {
        self.leader
    }

    fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn get_table_manager(&self, table: &str) -> Option<Arc<dyn TableManager>> {
        let tables = self.tables.read().expect("tablespace lock poisoned");
        tables
            .get(table)
            .cloned()
            .map(|tm| tm as Arc<dyn TableManager>)
    }
}

/// Factory producing [`LocalTableSpaceManager`] instances
#[derive(Default)]
pub struct LocalTableSpaceFactory;

impl LocalTableSpaceFactory {
    pub fn new() -> Self {
        Self
    }
}

impl TableSpaceFactory for LocalTableSpaceFactory {
    fn create(
        &self,
        descriptor: &TableSpaceDescriptor,
        log: Box<dyn CommitLog>,
        runtime: Arc<NodeRuntime>,
    ) -> Result<Arc<dyn TableSpaceManager>> {
        let manager = Arc::new(LocalTableSpaceManager::new(descriptor, log, runtime));
        *manager.self_ref.lock().expect("self ref lock poisoned") = Arc::downgrade(&manager);
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryMetadataStore;
    use crate::node::pool::WorkerPool;
    use crate::storage::{MemoryPageStore, PageStore};
    use crate::wal::{EntryConsumer, MemoryCommitLog};

    fn runtime(node_id: &str) -> (Arc<NodeRuntime>, Arc<MemoryPageStore>) {
        let pages = Arc::new(MemoryPageStore::new());
        pages.start().unwrap();
        let rt = Arc::new(NodeRuntime::new(
            node_id.to_string(),
            Arc::new(MemoryMetadataStore::new()),
            pages.clone() as Arc<dyn crate::storage::PageStore>,
            Arc::new(WorkerPool::new()),
        ));
        (rt, pages)
    }

    fn leader_manager(rt: Arc<NodeRuntime>) -> Arc<dyn TableSpaceManager> {
        let descriptor = TableSpaceDescriptor::single_node("ts1", "n1");
        let manager = LocalTableSpaceFactory::new()
            .create(&descriptor, Box::new(MemoryCommitLog::new()), rt)
            .unwrap();
        manager.start().unwrap();
        manager
    }

    /// Shares one in-memory log between two manager incarnations
    struct SharedLog(Arc<MemoryCommitLog>);

    impl CommitLog for SharedLog {
        fn log(&self, entry: LogEntry) -> Result<Lsn> {
            self.0.log(entry)
        }
        fn log_batch(&self, entries: Vec<LogEntry>) -> Result<Vec<Lsn>> {
            self.0.log_batch(entries)
        }
        fn recover(&self, from: Lsn, consumer: &mut EntryConsumer<'_>, fencing: bool) -> Result<()> {
            self.0.recover(from, consumer, fencing)
        }
        fn follow(&self, from: Lsn, consumer: &mut EntryConsumer<'_>) -> Result<()> {
            self.0.follow(from, consumer)
        }
        fn current_lsn(&self) -> Lsn {
            self.0.current_lsn()
        }
        fn start_writing(&self) -> Result<()> {
            self.0.start_writing()
        }
        fn clear(&self) -> Result<()> {
            self.0.clear()
        }
        fn close(&self) -> Result<()> {
            // The log outlives each incarnation in these tests
            Ok(())
        }
        fn is_closed(&self) -> bool {
            self.0.is_closed()
        }
        fn checkpoint(&self) -> Result<()> {
            self.0.checkpoint()
        }
    }

    /// Log that refuses every append, for poisoning tests
    struct BrokenLog;

    impl CommitLog for BrokenLog {
        fn log(&self, _entry: LogEntry) -> Result<Lsn> {
            Err(NodeError::Log("disk on fire".into()))
        }
        fn log_batch(&self, _entries: Vec<LogEntry>) -> Result<Vec<Lsn>> {
            Err(NodeError::Log("disk on fire".into()))
        }
        fn recover(&self, _from: Lsn, _c: &mut EntryConsumer<'_>, _f: bool) -> Result<()> {
            Ok(())
        }
        fn follow(&self, _from: Lsn, _c: &mut EntryConsumer<'_>) -> Result<()> {
            Ok(())
        }
        fn current_lsn(&self) -> Lsn {
            0
        }
        fn start_writing(&self) -> Result<()> {
            Ok(())
        }
        fn clear(&self) -> Result<()> {
            Ok(())
        }
        fn close(&self) -> Result<()> {
            Ok(())
        }
        fn is_closed(&self) -> bool {
            false
        }
        fn checkpoint(&self) -> Result<()> {
            Ok(())
        }
    }

    fn key(n: i64) -> RawKey {
        RawKey::from_i64(n)
    }

    #[test]
    fn test_ddl_and_dml_round_trip() {
        let (rt, _) = runtime("n1");
        let manager = leader_manager(rt);

        manager
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap();

        let result = manager
            .execute_statement(&Statement::insert("ts1", "users", key(1), Bytes::from("alice")))
            .unwrap()
            .into_dml()
            .unwrap();
        assert_eq!(result.update_count, 1);
        assert_eq!(result.key, Some(key(1)));

        let got = manager
            .execute_statement(&Statement::get("ts1", "users", key(1)))
            .unwrap()
            .into_get()
            .unwrap();
        assert_eq!(got.record.unwrap().value, Bytes::from("alice"));
    }

    #[test]
    fn test_insert_duplicate_key_fails() {
        let (rt, _) = runtime("n1");
        let manager = leader_manager(rt);
        manager
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap();
        manager
            .execute_statement(&Statement::insert("ts1", "users", key(1), Bytes::from("a")))
            .unwrap();
        let err = manager
            .execute_statement(&Statement::insert("ts1", "users", key(1), Bytes::from("b")))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn test_update_and_delete_missing_key_touch_nothing() {
        let (rt, _) = runtime("n1");
        let manager = leader_manager(rt);
        manager
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap();

        let updated = manager
            .execute_statement(&Statement::update("ts1", "users", key(9), Bytes::from("x")))
            .unwrap()
            .into_dml()
            .unwrap();
        assert_eq!(updated.update_count, 0);

        let deleted = manager
            .execute_statement(&Statement::delete("ts1", "users", key(9)))
            .unwrap()
            .into_dml()
            .unwrap();
        assert_eq!(deleted.update_count, 0);
    }

    #[test]
    fn test_dml_on_unknown_table_fails() {
        let (rt, _) = runtime("n1");
        let manager = leader_manager(rt);
        let err = manager
            .execute_statement(&Statement::insert("ts1", "ghost", key(1), Bytes::from("x")))
            .unwrap_err();
        assert!(err.to_string().contains("doesn't exist"));
    }

    #[test]
    fn test_create_existing_table_fails() {
        let (rt, _) = runtime("n1");
        let manager = leader_manager(rt);
        manager
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap();
        let err = manager
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap_err();
        assert!(matches!(err, NodeError::Ddl(_)));
    }

    #[test]
    fn test_follower_rejects_writes() {
        let (rt, _) = runtime("n1");
        let descriptor = TableSpaceDescriptor::builder()
            .name("ts1")
            .leader("n2")
            .replicas(["n1", "n2"])
            .build()
            .unwrap();
        let manager = LocalTableSpaceFactory::new()
            .create(&descriptor, Box::new(MemoryCommitLog::new()), rt)
            .unwrap();
        manager.start().unwrap();

        assert!(!manager.is_leader());
        let err = manager
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap_err();
        assert!(err.to_string().contains("not led by this node"));
    }

    #[test]
    fn test_transactional_statement_is_rejected() {
        let (rt, _) = runtime("n1");
        let manager = leader_manager(rt);
        manager
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap();
        let err = manager
            .execute_statement(
                &Statement::insert("ts1", "users", key(1), Bytes::from("x")).in_transaction(5),
            )
            .unwrap_err();
        assert!(err.to_string().contains("unknown transaction"));
    }

    #[test]
    fn test_wal_failure_poisons_the_tablespace() {
        let (rt, _) = runtime("n1");
        let descriptor = TableSpaceDescriptor::single_node("ts1", "n1");
        let manager = LocalTableSpaceFactory::new()
            .create(&descriptor, Box::new(BrokenLog), rt)
            .unwrap();
        manager.start().unwrap();

        let err = manager
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap_err();
        assert!(matches!(err, NodeError::Log(_)));
        assert!(manager.is_failed());

        // Poisoned managers reject everything until evicted
        let err = manager
            .execute_statement(&Statement::get("ts1", "users", key(1)))
            .unwrap_err();
        assert!(err.to_string().contains("failed"));
    }

    #[test]
    fn test_recovery_from_wal_replay() {
        let (rt, _) = runtime("n1");
        let descriptor = TableSpaceDescriptor::single_node("ts1", "n1");
        let shared = Arc::new(MemoryCommitLog::new());

        let first = LocalTableSpaceFactory::new()
            .create(&descriptor, Box::new(SharedLog(Arc::clone(&shared))), Arc::clone(&rt))
            .unwrap();
        first.start().unwrap();
        first
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap();
        first
            .execute_statement(&Statement::insert("ts1", "users", key(1), Bytes::from("alice")))
            .unwrap();

        // No flush: the second incarnation must rebuild from the log
        let second = LocalTableSpaceFactory::new()
            .create(&descriptor, Box::new(SharedLog(shared)), rt)
            .unwrap();
        second.start().unwrap();

        let got = second
            .execute_statement(&Statement::get("ts1", "users", key(1)))
            .unwrap()
            .into_get()
            .unwrap();
        assert_eq!(got.record.unwrap().value, Bytes::from("alice"));
        assert!(second.get_table_manager("users").is_some());
    }

    #[test]
    fn test_recovery_from_snapshot_pages() {
        let (rt, pages) = runtime("n1");
        let descriptor = TableSpaceDescriptor::single_node("ts1", "n1");

        let first = LocalTableSpaceFactory::new()
            .create(&descriptor, Box::new(MemoryCommitLog::new()), Arc::clone(&rt))
            .unwrap();
        first.start().unwrap();
        first
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap();
        first
            .execute_statement(&Statement::insert("ts1", "users", key(7), Bytes::from("bob")))
            .unwrap();
        first.flush().unwrap();
        assert!(pages.last_checkpoint_lsn("ts1") > 0);

        // Fresh empty log: everything must come back from the pages
        let second = LocalTableSpaceFactory::new()
            .create(&descriptor, Box::new(MemoryCommitLog::new()), rt)
            .unwrap();
        second.start().unwrap();

        let got = second
            .execute_statement(&Statement::get("ts1", "users", key(7)))
            .unwrap()
            .into_get()
            .unwrap();
        assert_eq!(got.record.unwrap().value, Bytes::from("bob"));
        let tm = second.get_table_manager("users").unwrap();
        assert_eq!(tm.record_count(), 1);
    }

    #[test]
    fn test_closed_manager_rejects_statements() {
        let (rt, _) = runtime("n1");
        let manager = leader_manager(rt);
        manager.close().unwrap();
        let err = manager
            .execute_statement(&Statement::get("ts1", "users", key(1)))
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_get_table_manager_reports_catalog() {
        let (rt, _) = runtime("n1");
        let manager = leader_manager(rt);
        assert!(manager.get_table_manager("users").is_none());
        manager
            .execute_statement(&Statement::create_table("ts1", "users"))
            .unwrap();
        let tm = manager.get_table_manager("users").unwrap();
        assert_eq!(tm.name(), "users");
        assert_eq!(tm.record_count(), 0);
    }
}
