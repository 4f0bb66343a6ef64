//! File-backed page store
//!
//! ## On-disk layout
//!
//! ```text
//! data/
//! └── <tablespace>/
//!     ├── tables.json   # table catalog + checkpoint LSN
//!     └── <table>/
//!         ├── 1.page    # one JSON record per line
//!         ├── 2.page
//!         └── ...
//! ```
//!
//! Pages are immutable once written; a new checkpoint writes new pages
//! and replaces `tables.json` with an atomic tmp-file rename.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::codec::RawKey;
use crate::error::{NodeError, Result};
use crate::wal::Lsn;

use super::{PageStore, Record, Table};

/// Catalog file stored per tablespace
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpaceCatalog {
    checkpoint_lsn: Lsn,
    tables: Vec<Table>,
}

/// Page store persisting pages as JSONL files under a data directory
pub struct FilePageStore {
    data_dir: PathBuf,
    /// (space, table) -> next page id; lazily seeded from the directory
    next_page: Mutex<HashMap<(String, String), u64>>,
    closed: AtomicBool,
}

fn storage_err(e: std::io::Error) -> NodeError {
    NodeError::Storage(e.to_string())
}

/// Reject names that could escape the data directory
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NodeError::Storage("empty name".into()));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(NodeError::Storage(format!(
            "invalid name '{}': contains forbidden characters",
            name
        )));
    }
    if name.len() > 255 {
        return Err(NodeError::Storage("name too long".into()));
    }
    Ok(())
}

impl FilePageStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            next_page: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn space_dir(&self, space: &str) -> PathBuf {
        self.data_dir.join(space)
    }

    fn table_dir(&self, space: &str, table: &str) -> PathBuf {
        self.space_dir(space).join(table)
    }

    fn page_path(&self, space: &str, table: &str, page_id: u64) -> PathBuf {
        self.table_dir(space, table).join(format!("{}.page", page_id))
    }

    fn catalog_path(&self, space: &str) -> PathBuf {
        self.space_dir(space).join("tables.json")
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NodeError::Storage("page store is closed".into()));
        }
        Ok(())
    }

    /// Highest page id currently on disk for a table
    fn scan_max_page(&self, space: &str, table: &str) -> Result<u64> {
        let dir = self.table_dir(space, table);
        if !dir.exists() {
            return Ok(0);
        }
        let mut max = 0;
        for entry in fs::read_dir(&dir).map_err(storage_err)? {
            let entry = entry.map_err(storage_err)?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".page").and_then(|s| s.parse::<u64>().ok()) {
                max = max.max(id);
            }
        }
        Ok(max)
    }

    fn read_catalog(&self, space: &str) -> Result<Option<SpaceCatalog>> {
        let path = self.catalog_path(space);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path).map_err(storage_err)?;
        let catalog: SpaceCatalog = serde_json::from_reader(file).map_err(|e| {
            NodeError::Storage(format!(
                "failed to parse table catalog '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(catalog))
    }
}

impl PageStore for FilePageStore {
    fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(storage_err)?;
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn load_page(&self, space: &str, table: &str, page_id: u64) -> Result<Vec<Record>> {
        self.check_open()?;
        validate_name(space)?;
        validate_name(table)?;
        let path = self.page_path(space, table, page_id);
        let file = File::open(&path).map_err(|e| {
            NodeError::Storage(format!(
                "page {} of table '{}' not readable: {}",
                page_id, table, e
            ))
        })?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(storage_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line).map_err(|e| {
                NodeError::Storage(format!(
                    "failed to parse record in '{}', line {}: {}",
                    path.display(),
                    idx + 1,
                    e
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn load_existing_keys(
        &self,
        space: &str,
        table: &str,
        consumer: &mut dyn FnMut(&RawKey),
    ) -> Result<()> {
        self.check_open()?;
        validate_name(space)?;
        validate_name(table)?;
        let max = self.scan_max_page(space, table)?;
        for page_id in 1..=max {
            if !self.page_path(space, table, page_id).exists() {
                continue;
            }
            for record in self.load_page(space, table, page_id)? {
                consumer(&record.key);
            }
        }
        Ok(())
    }

    fn write_page(&self, space: &str, table: &str, _lsn: Lsn, records: &[Record]) -> Result<u64> {
        self.check_open()?;
        validate_name(space)?;
        validate_name(table)?;

        let dir = self.table_dir(space, table);
        fs::create_dir_all(&dir).map_err(storage_err)?;

        let page_id = {
            let mut next = self.next_page.lock().expect("page counter lock poisoned");
            let key = (space.to_string(), table.to_string());
            let slot = match next.get_mut(&key) {
                Some(slot) => slot,
                None => {
                    let seeded = self.scan_max_page(space, table)? + 1;
                    next.entry(key).or_insert(seeded)
                }
            };
            let id = *slot;
            *slot += 1;
            id
        };

        let path = self.page_path(space, table, page_id);
        let temp_path = path.with_extension("page.tmp");
        let file = File::create(&temp_path).map_err(storage_err)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            let json = serde_json::to_string(record)?;
            writeln!(writer, "{}", json).map_err(storage_err)?;
        }
        writer.flush().map_err(storage_err)?;
        writer
            .into_inner()
            .map_err(|e| NodeError::Storage(e.to_string()))?
            .sync_data()
            .map_err(storage_err)?;

        // Atomic rename for crash safety
        fs::rename(&temp_path, &path).map_err(storage_err)?;
        Ok(page_id)
    }

    fn actual_number_of_pages(&self, space: &str, table: &str) -> Result<u64> {
        self.check_open()?;
        validate_name(space)?;
        validate_name(table)?;
        let dir = self.table_dir(space, table);
        if !dir.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in fs::read_dir(&dir).map_err(storage_err)? {
            let entry = entry.map_err(storage_err)?;
            if entry.file_name().to_string_lossy().ends_with(".page") {
                count += 1;
            }
        }
        Ok(count)
    }

    fn load_tables(&self, _lsn: Lsn, space: &str) -> Result<Vec<Table>> {
        self.check_open()?;
        validate_name(space)?;
        Ok(self
            .read_catalog(space)?
            .map(|c| c.tables)
            .unwrap_or_default())
    }

    fn write_tables(&self, space: &str, lsn: Lsn, tables: &[Table]) -> Result<()> {
        self.check_open()?;
        validate_name(space)?;
        fs::create_dir_all(self.space_dir(space)).map_err(storage_err)?;

        let path = self.catalog_path(space);
        let temp_path = path.with_extension("json.tmp");
        let catalog = SpaceCatalog {
            checkpoint_lsn: lsn,
            tables: tables.to_vec(),
        };
        let file = File::create(&temp_path).map_err(storage_err)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &catalog)?;

        fs::rename(&temp_path, &path).map_err(storage_err)?;
        Ok(())
    }

    fn last_checkpoint_lsn(&self, space: &str) -> Lsn {
        match self.read_catalog(space) {
            Ok(Some(catalog)) => catalog.checkpoint_lsn,
            Ok(None) => 0,
            Err(e) => {
                log::warn!("could not read checkpoint LSN for '{}': {}", space, e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    fn record(n: i64) -> Record {
        Record::new(RawKey::from_i64(n), Bytes::from(format!("v{}", n)))
    }

    #[test]
    fn test_write_page_and_reload() {
        let dir = tempdir().unwrap();
        let store = FilePageStore::new(dir.path().to_path_buf());
        store.start().unwrap();

        let page_id = store
            .write_page("ts1", "users", 7, &[record(1), record(2)])
            .unwrap();
        let loaded = store.load_page("ts1", "users", page_id).unwrap();
        assert_eq!(loaded, vec![record(1), record(2)]);
    }

    #[test]
    fn test_page_counter_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FilePageStore::new(dir.path().to_path_buf());
            store.start().unwrap();
            assert_eq!(store.write_page("ts1", "users", 1, &[record(1)]).unwrap(), 1);
            assert_eq!(store.write_page("ts1", "users", 2, &[record(2)]).unwrap(), 2);
        }
        // A fresh store must not reuse page ids
        let store = FilePageStore::new(dir.path().to_path_buf());
        store.start().unwrap();
        assert_eq!(store.write_page("ts1", "users", 3, &[record(3)]).unwrap(), 3);
        assert_eq!(store.actual_number_of_pages("ts1", "users").unwrap(), 3);
    }

    #[test]
    fn test_tables_catalog_round_trip() {
        let dir = tempdir().unwrap();
        let store = FilePageStore::new(dir.path().to_path_buf());
        store.start().unwrap();

        let tables = vec![Table { name: "users".into(), created_lsn: 3, snapshot_page: Some(1) }];
        store.write_tables("ts1", 9, &tables).unwrap();
        assert_eq!(store.load_tables(9, "ts1").unwrap(), tables);
        assert_eq!(store.last_checkpoint_lsn("ts1"), 9);
    }

    #[test]
    fn test_missing_catalog_means_no_tables() {
        let dir = tempdir().unwrap();
        let store = FilePageStore::new(dir.path().to_path_buf());
        store.start().unwrap();
        assert!(store.load_tables(0, "fresh").unwrap().is_empty());
        assert_eq!(store.last_checkpoint_lsn("fresh"), 0);
    }

    #[test]
    fn test_load_existing_keys() {
        let dir = tempdir().unwrap();
        let store = FilePageStore::new(dir.path().to_path_buf());
        store.start().unwrap();
        store.write_page("ts1", "users", 1, &[record(1), record(2)]).unwrap();
        store.write_page("ts1", "users", 2, &[record(3)]).unwrap();

        let mut keys = Vec::new();
        store
            .load_existing_keys("ts1", "users", &mut |k| keys.push(k.clone()))
            .unwrap();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_rejects_path_traversal_names() {
        let dir = tempdir().unwrap();
        let store = FilePageStore::new(dir.path().to_path_buf());
        store.start().unwrap();
        assert!(store.load_page("../etc", "users", 1).is_err());
        assert!(store.write_page("ts1", "a/b", 1, &[]).is_err());
    }
}
