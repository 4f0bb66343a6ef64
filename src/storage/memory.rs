//! In-memory page store
//!
//! Backs tests and single-process deployments that do not need pages to
//! survive a restart. Same contract as the file-backed store, minus
//! durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::codec::RawKey;
use crate::error::{NodeError, Result};
use crate::wal::Lsn;

use super::{PageStore, Record, Table};

#[derive(Default)]
struct SpaceData {
    /// (table, page id) -> records
    pages: HashMap<(String, u64), Vec<Record>>,
    /// table -> next page id
    next_page: HashMap<String, u64>,
    tables: Vec<Table>,
    checkpoint_lsn: Lsn,
}

/// Page store keeping everything in process memory
#[derive(Default)]
pub struct MemoryPageStore {
    spaces: RwLock<HashMap<String, SpaceData>>,
    closed: AtomicBool,
}

impl MemoryPageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Storage("page store is closed".into()));
        }
        Ok(())
    }
}

impl PageStore for MemoryPageStore {
    fn start(&self) -> Result<()> {
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn load_page(&self, space: &str, table: &str, page_id: u64) -> Result<Vec<Record>> {
        self.check_open()?;
        let spaces = self.spaces.read().expect("page store lock poisoned");
        let records = spaces
            .get(space)
            .and_then(|s| s.pages.get(&(table.to_string(), page_id)))
            .cloned()
            .ok_or_else(|| {
                NodeError::Storage(format!("page {} of table '{}' not found", page_id, table))
            })?;
        Ok(records)
    }

    fn load_existing_keys(
        &self,
        space: &str,
        table: &str,
        consumer: &mut dyn FnMut(&RawKey),
    ) -> Result<()> {
        self.check_open()?;
        let spaces = self.spaces.read().expect("page store lock poisoned");
        if let Some(data) = spaces.get(space) {
            for ((t, _), records) in &data.pages {
                if t == table {
                    for record in records {
                        consumer(&record.key);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_page(&self, space: &str, table: &str, _lsn: Lsn, records: &[Record]) -> Result<u64> {
        self.check_open()?;
        let mut spaces = self.spaces.write().expect("page store lock poisoned");
        let data = spaces.entry(space.to_string()).or_default();
        let next = data.next_page.entry(table.to_string()).or_insert(1);
        let page_id = *next;
        *next += 1;
        data.pages
            .insert((table.to_string(), page_id), records.to_vec());
        Ok(page_id)
    }

    fn actual_number_of_pages(&self, space: &str, table: &str) -> Result<u64> {
        self.check_open()?;
        let spaces = self.spaces.read().expect("page store lock poisoned");
        let count = spaces
            .get(space)
            .map(|s| s.pages.keys().filter(|(t, _)| t == table).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    fn load_tables(&self, _lsn: Lsn, space: &str) -> Result<Vec<Table>> {
        self.check_open()?;
        let spaces = self.spaces.read().expect("page store lock poisoned");
        Ok(spaces.get(space).map(|s| s.tables.clone()).unwrap_or_default())
    }

    fn write_tables(&self, space: &str, lsn: Lsn, tables: &[Table]) -> Result<()> {
        self.check_open()?;
        let mut spaces = self.spaces.write().expect("page store lock poisoned");
        let data = spaces.entry(space.to_string()).or_default();
        data.tables = tables.to_vec();
        data.checkpoint_lsn = lsn;
        Ok(())
    }

    fn last_checkpoint_lsn(&self, space: &str) -> Lsn {
        let spaces = self.spaces.read().expect("page store lock poisoned");
        spaces.get(space).map(|s| s.checkpoint_lsn).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn record(n: i64) -> Record {
        Record::new(RawKey::from_i64(n), Bytes::from(format!("v{}", n)))
    }

    #[test]
    fn test_write_and_load_page() {
        let store = MemoryPageStore::new();
        store.start().unwrap();

        let page_id = store
            .write_page("ts1", "users", 5, &[record(1), record(2)])
            .unwrap();
        let loaded = store.load_page("ts1", "users", page_id).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].key, RawKey::from_i64(1));
    }

    #[test]
    fn test_page_ids_are_sequential_per_table() {
        let store = MemoryPageStore::new();
        store.start().unwrap();

        let p1 = store.write_page("ts1", "users", 1, &[record(1)]).unwrap();
        let p2 = store.write_page("ts1", "users", 2, &[record(2)]).unwrap();
        let other = store.write_page("ts1", "orders", 3, &[record(3)]).unwrap();
        assert_eq!(p1, 1);
        assert_eq!(p2, 2);
        assert_eq!(other, 1);
        assert_eq!(store.actual_number_of_pages("ts1", "users").unwrap(), 2);
    }

    #[test]
    fn test_load_missing_page_fails() {
        let store = MemoryPageStore::new();
        store.start().unwrap();
        assert!(store.load_page("ts1", "users", 99).is_err());
    }

    #[test]
    fn test_load_existing_keys_visits_all_pages() {
        let store = MemoryPageStore::new();
        store.start().unwrap();
        store.write_page("ts1", "users", 1, &[record(1), record(2)]).unwrap();
        store.write_page("ts1", "users", 2, &[record(3)]).unwrap();

        let mut seen = Vec::new();
        store
            .load_existing_keys("ts1", "users", &mut |k| seen.push(k.clone()))
            .unwrap();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_tables_catalog_round_trip() {
        let store = MemoryPageStore::new();
        store.start().unwrap();

        let tables = vec![Table { name: "users".into(), created_lsn: 4, snapshot_page: None }];
        store.write_tables("ts1", 10, &tables).unwrap();

        assert_eq!(store.load_tables(10, "ts1").unwrap(), tables);
        assert_eq!(store.last_checkpoint_lsn("ts1"), 10);
        assert_eq!(store.last_checkpoint_lsn("ts2"), 0);
    }

    #[test]
    fn test_closed_store_rejects_io() {
        let store = MemoryPageStore::new();
        store.start().unwrap();
        store.close().unwrap();
        assert!(store.write_page("ts1", "users", 1, &[record(1)]).is_err());
    }
}
