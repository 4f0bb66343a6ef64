//! Node manager
//!
//! The node manager is the public façade of one cluster member. It
//! owns the registry of locally hosted tablespaces, the activator
//! thread that keeps the registry consistent with cluster metadata,
//! and the worker pool for background tasks. The metadata store, log
//! manager and page store are shared collaborators whose lifecycle is
//! tied to the node: started in `start`, closed during activator
//! shutdown.
//!
//! Locking: one readers-writer lock guards the registry and the
//! collaborator start/stop steps. Statement dispatch takes it shared
//! just long enough to look up a manager and releases it before
//! delegating, so the lock is never held across a client-visible
//! tablespace call.

pub mod activator;
pub mod pool;
pub mod registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{NodeError, Result};
use crate::metadata::{MetadataStore, TableSpaceDescriptor};
use crate::statement::{
    DdlResult, DmlResult, GetResult, Statement, StatementBody, StatementResult, NO_TRANSACTION,
};
use crate::storage::PageStore;
use crate::tablespace::{
    LocalTableSpaceFactory, NodeRuntime, TableSpaceFactory, TableSpaceManager,
};
use crate::wal::LogManager;

use activator::activator_loop;
use pool::WorkerPool;
use registry::TableSpaceRegistry;

/// Sleep between availability polls in `wait_for_*`. A design
/// parameter, not part of the contract.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// State shared between the node manager and its activator thread
pub(crate) struct NodeInner {
    pub(crate) node_id: String,
    pub(crate) metadata: Arc<dyn MetadataStore>,
    pub(crate) logs: Arc<dyn LogManager>,
    pub(crate) pages: Arc<dyn PageStore>,
    pub(crate) factory: Arc<dyn TableSpaceFactory>,
    pub(crate) runtime: Arc<NodeRuntime>,
    /// The general lock: shared for dispatch and snapshots, exclusive
    /// for boot, eviction and collaborator start/stop
    pub(crate) registry: RwLock<TableSpaceRegistry>,
    pub(crate) stopped: AtomicBool,
}

/// The node-level control plane: boots tablespaces assigned to this
/// node, routes statements to them, and shuts everything down in order.
pub struct NodeManager {
    inner: Arc<NodeInner>,
    pool: Arc<WorkerPool>,
    wakeup: SyncSender<()>,
    /// Consumed by the activator thread at `start`
    wakeup_slot: Mutex<Option<Receiver<()>>>,
    activator: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl NodeManager {
    /// Node with the default local tablespace executor
    pub fn new(
        node_id: impl Into<String>,
        metadata: Arc<dyn MetadataStore>,
        logs: Arc<dyn LogManager>,
        pages: Arc<dyn PageStore>,
    ) -> Self {
        Self::with_factory(node_id, metadata, logs, pages, Arc::new(LocalTableSpaceFactory::new()))
    }

    /// Node with a custom tablespace factory
    pub fn with_factory(
        node_id: impl Into<String>,
        metadata: Arc<dyn MetadataStore>,
        logs: Arc<dyn LogManager>,
        pages: Arc<dyn PageStore>,
        factory: Arc<dyn TableSpaceFactory>,
    ) -> Self {
        let node_id = node_id.into();
        let pool = Arc::new(WorkerPool::new());
        let runtime = Arc::new(NodeRuntime::new(
            node_id.clone(),
            Arc::clone(&metadata),
            Arc::clone(&pages),
            Arc::clone(&pool),
        ));
        // One slot: concurrent pokes collapse into one pending pass
        let (wakeup, wakeup_rx) = mpsc::sync_channel(1);
        Self {
            inner: Arc::new(NodeInner {
                node_id,
                metadata,
                logs,
                pages,
                factory,
                runtime,
                registry: RwLock::new(TableSpaceRegistry::new()),
                stopped: AtomicBool::new(false),
            }),
            pool,
            wakeup,
            wakeup_slot: Mutex::new(Some(wakeup_rx)),
            activator: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Boot the node: start the metadata store, make sure the default
    /// tablespace exists, start the page store and the log manager,
    /// then launch the activator. Any failure here is fatal.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(NodeError::Execution("node manager already started".into()));
        }

        self.inner.metadata.start()?;
        self.inner
            .metadata
            .ensure_default_table_space(&self.inner.node_id)?;

        {
            let _guard = self.inner.registry.write().expect("registry lock poisoned");
            self.inner.pages.start()?;
            self.inner.logs.start()?;
        }

        let wakeup_rx = self
            .wakeup_slot
            .lock()
            .expect("wakeup slot lock poisoned")
            .take()
            .ok_or_else(|| NodeError::Execution("node manager already started".into()))?;
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::spawn(move || activator_loop(inner, wakeup_rx));
        *self.activator.lock().expect("activator lock poisoned") = Some(handle);

        self.trigger_activator();
        log::info!("node '{}' started", self.inner.node_id);
        Ok(())
    }

    /// Wake the activator. Never blocks and never fails: if the slot is
    /// already full, a pass is pending anyway.
    pub fn trigger_activator(&self) {
        let _ = self.wakeup.try_send(());
    }

    /// Route one statement. `CreateTableSpace` is handled here; every
    /// other statement goes to the hosting tablespace manager.
    pub fn execute_statement(&self, stmt: Statement) -> Result<StatementResult> {
        if stmt.table_space.is_empty() {
            return Err(NodeError::InvalidStatement(
                "statement does not target a tablespace".into(),
            ));
        }

        if let StatementBody::CreateTableSpace { .. } = &stmt.body {
            if stmt.transaction_id != NO_TRANSACTION {
                return Err(NodeError::InvalidStatement(
                    "CREATE TABLESPACE cannot run inside a transaction".into(),
                ));
            }
            return self.create_table_space(&stmt);
        }

        // Shared lock only around the lookup; the manager call runs
        // without it
        let manager = {
            let registry = self.inner.registry.read().expect("registry lock poisoned");
            registry.lookup(&stmt.table_space)
        }
        .ok_or_else(|| NodeError::no_such_table_space(&stmt.table_space))?;
        manager.execute_statement(&stmt)
    }

    /// Register a new tablespace in the cluster catalog. The local boot
    /// (when this node is a replica) happens asynchronously on the next
    /// reconciliation pass; callers needing the tablespace ready should
    /// use [`NodeManager::wait_for_table_space`].
    pub fn create_table_space(&self, stmt: &Statement) -> Result<StatementResult> {
        let (name, leader, replicas) = match &stmt.body {
            StatementBody::CreateTableSpace { name, leader, replicas } => (name, leader, replicas),
            other => {
                return Err(NodeError::InvalidStatement(format!(
                    "expected CREATE TABLESPACE, got {}",
                    other.kind()
                )))
            }
        };

        // The builder validates before anything touches the catalog
        let descriptor = TableSpaceDescriptor::builder()
            .name(name)
            .leader(leader)
            .replicas(replicas.iter().cloned())
            .build()?;

        self.inner.metadata.register(descriptor)?;
        self.trigger_activator();
        log::info!("tablespace '{}' registered (leader '{}')", name, leader);
        Ok(StatementResult::Ddl(DdlResult {
            transaction_id: stmt.transaction_id,
        }))
    }

    /// Execute a point lookup, asserting the result shape
    pub fn get(&self, stmt: Statement) -> Result<GetResult> {
        self.execute_statement(stmt)?.into_get()
    }

    /// Execute a DML statement, asserting the result shape
    pub fn execute_update(&self, stmt: Statement) -> Result<DmlResult> {
        self.execute_statement(stmt)?.into_dml()
    }

    fn wait_until<F>(&self, timeout_ms: u64, predicate: F) -> bool
    where
        F: Fn(&TableSpaceRegistry) -> bool,
    {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let ready = {
                let registry = self.inner.registry.read().expect("registry lock poisoned");
                predicate(&registry)
            };
            if ready {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            std::thread::sleep(remaining.min(WAIT_POLL_INTERVAL));
        }
    }

    /// Poll until a manager for `name` is available locally (and, if
    /// `require_leader`, is the leader). Returns false on timeout;
    /// `timeout_ms == 0` reports the current availability.
    pub fn wait_for_table_space(&self, name: &str, timeout_ms: u64, require_leader: bool) -> bool {
        self.wait_until(timeout_ms, |registry| {
            registry
                .lookup(name)
                .map(|m| !require_leader || m.is_leader())
                .unwrap_or(false)
        })
    }

    /// As [`NodeManager::wait_for_table_space`], additionally requiring
    /// the tablespace catalog to contain `table`
    pub fn wait_for_table(
        &self,
        space: &str,
        table: &str,
        timeout_ms: u64,
        require_leader: bool,
    ) -> bool {
        self.wait_until(timeout_ms, |registry| {
            registry
                .lookup(space)
                .map(|m| {
                    (!require_leader || m.is_leader()) && m.get_table_manager(table).is_some()
                })
                .unwrap_or(false)
        })
    }

    /// Checkpoint every hosted tablespace. The registry is snapshotted
    /// under the shared lock; the flushes run without it. The first
    /// failure is surfaced.
    pub fn flush(&self) -> Result<()> {
        let managers = {
            let registry = self.inner.registry.read().expect("registry lock poisoned");
            registry.snapshot()
        };
        for manager in managers {
            manager.flush()?;
        }
        Ok(())
    }

    /// Manager currently hosting `name`, if any
    pub fn get_table_space_manager(&self, name: &str) -> Option<Arc<dyn TableSpaceManager>> {
        let registry = self.inner.registry.read().expect("registry lock poisoned");
        registry.lookup(name)
    }

    /// Offer background work to the worker pool. Rejections are logged
    /// and dropped; this is for non-critical work only.
    pub fn submit<F>(&self, name: &str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.submit(name, task);
    }

    /// Orderly shutdown: stop the activator (which closes every
    /// tablespace, then the log manager, page store and metadata
    /// store), then stop the worker pool. Idempotent; never fails.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("closing node '{}'", self.inner.node_id);
        self.inner.stopped.store(true, Ordering::Release);
        let _ = self.wakeup.try_send(());

        let handle = self
            .activator
            .lock()
            .expect("activator lock poisoned")
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("activator thread panicked during shutdown");
            }
        }
        self.pool.shutdown();
        log::info!("node '{}' closed", self.inner.node_id);
    }
}

impl Drop for NodeManager {
    fn drop(&mut self) {
        self.close();
    }
}
