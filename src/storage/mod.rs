//! Page storage for tablespace data
//!
//! The page store holds physical pages keyed by (table, page id) plus
//! per-tablespace table metadata. Tablespace managers write immutable
//! pages at checkpoint time and reload them on boot; the store itself
//! knows nothing about row semantics.

pub mod files;
pub mod memory;

pub use files::FilePageStore;
pub use memory::MemoryPageStore;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::RawKey;
use crate::error::Result;
use crate::wal::Lsn;

/// A stored record: an encoded key and an opaque value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: RawKey,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: RawKey, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// Metadata for one table inside a tablespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// LSN of the statement that created the table
    pub created_lsn: Lsn,
    /// Page holding the table's last full snapshot, if one was written
    pub snapshot_page: Option<u64>,
}

/// Physical page storage shared by all tablespaces on the node.
///
/// Page operations are keyed by (table, page id); tables are scoped to
/// their tablespace. Implementations must be safe for concurrent use:
/// different tablespace managers checkpoint independently.
pub trait PageStore: Send + Sync {
    fn start(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    /// Load one page of records
    fn load_page(&self, space: &str, table: &str, page_id: u64) -> Result<Vec<Record>>;

    /// Stream every key currently stored for a table
    fn load_existing_keys(
        &self,
        space: &str,
        table: &str,
        consumer: &mut dyn FnMut(&RawKey),
    ) -> Result<()>;

    /// Write a page of records, durable as of `lsn`. Returns the new page id.
    fn write_page(&self, space: &str, table: &str, lsn: Lsn, records: &[Record]) -> Result<u64>;

    /// Number of pages currently stored for a table
    fn actual_number_of_pages(&self, space: &str, table: &str) -> Result<u64>;

    /// Load the table catalog of a tablespace as of the given checkpoint LSN
    fn load_tables(&self, lsn: Lsn, space: &str) -> Result<Vec<Table>>;

    /// Replace the table catalog of a tablespace, durable as of `lsn`
    fn write_tables(&self, space: &str, lsn: Lsn, tables: &[Table]) -> Result<()>;

    /// LSN of the last completed checkpoint for a tablespace (0 if none)
    fn last_checkpoint_lsn(&self, space: &str) -> Lsn;
}
