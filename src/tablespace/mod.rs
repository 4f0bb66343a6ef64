//! Per-tablespace execution
//!
//! A tablespace manager is the opaque executor for one tablespace. The
//! node owns its lifecycle: the activator constructs it through a
//! [`TableSpaceFactory`], calls `start`, and only then publishes it in
//! the registry; a manager whose `start` failed is never published.
//!
//! Managers never receive the whole node. They get a [`NodeRuntime`]:
//! a narrow capability carrying the node id, the shared collaborator
//! handles, and background-work submission.

pub mod local;

pub use local::{LocalTableSpaceFactory, LocalTableSpaceManager};

use std::sync::Arc;

use crate::error::Result;
use crate::metadata::{MetadataStore, TableSpaceDescriptor};
use crate::node::pool::WorkerPool;
use crate::statement::{Statement, StatementResult};
use crate::storage::PageStore;
use crate::wal::{CommitLog, Lsn};

/// Capabilities the node exposes to the tablespaces it hosts
pub struct NodeRuntime {
    node_id: String,
    metadata: Arc<dyn MetadataStore>,
    pages: Arc<dyn PageStore>,
    pool: Arc<WorkerPool>,
}

impl NodeRuntime {
    pub fn new(
        node_id: String,
        metadata: Arc<dyn MetadataStore>,
        pages: Arc<dyn PageStore>,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            node_id,
            metadata,
            pages,
            pool,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn page_store(&self) -> &Arc<dyn PageStore> {
        &self.pages
    }

    /// Offer background work to the node's worker pool. Rejections are
    /// logged by the pool, not surfaced.
    pub fn submit<F>(&self, name: &str, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.submit(name, task)
    }
}

/// Handle onto one table hosted by a tablespace
pub trait TableManager: Send + Sync {
    fn name(&self) -> &str;

    /// LSN of the entry that created the table
    fn created_lsn(&self) -> Lsn;

    fn record_count(&self) -> usize;
}

/// The per-tablespace executor.
///
/// Observable state: `is_leader` (fixed by the descriptor at boot) and
/// `is_failed`. Once `is_failed` turns true it stays true until the
/// manager is closed and removed from the registry.
pub trait TableSpaceManager: Send + Sync {
    fn name(&self) -> &str;

    /// Recover from storage and the log; must succeed before the
    /// manager becomes reachable
    fn start(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn execute_statement(&self, stmt: &Statement) -> Result<StatementResult>;

    /// Checkpoint: persist dirty tables and sync the log
    fn flush(&self) -> Result<()>;

    fn is_leader(&self) -> bool;

    fn is_failed(&self) -> bool;

    fn get_table_manager(&self, table: &str) -> Option<Arc<dyn TableManager>>;
}

/// Builds tablespace managers for the activator.
///
/// The factory is the seam between the node and the execution engine:
/// production uses [`LocalTableSpaceFactory`]; tests inject stub
/// managers through it.
pub trait TableSpaceFactory: Send + Sync {
    fn create(
        &self,
        descriptor: &TableSpaceDescriptor,
        log: Box<dyn CommitLog>,
        runtime: Arc<NodeRuntime>,
    ) -> Result<Arc<dyn TableSpaceManager>>;
}
