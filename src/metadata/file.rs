//! File-backed metadata store
//!
//! Persists the tablespace catalog as a single JSON file, rewritten
//! atomically (tmp file + rename) on every change. Suitable for
//! single-node deployments where the node is its own source of truth.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

use super::{MetadataStore, TableSpaceDescriptor, DEFAULT_TABLE_SPACE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MetadataCatalog {
    table_spaces: BTreeMap<String, TableSpaceDescriptor>,
}

/// Metadata store persisting the catalog under `<dir>/tablespaces.json`
pub struct FileMetadataStore {
    data_dir: PathBuf,
    catalog: RwLock<MetadataCatalog>,
}

fn metadata_err(e: std::io::Error) -> NodeError {
    NodeError::Metadata(e.to_string())
}

impl FileMetadataStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            catalog: RwLock::new(MetadataCatalog::default()),
        }
    }

    fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("tablespaces.json")
    }

    /// Persist the catalog with an atomic rename. Callers hold the
    /// write lock.
    fn save(&self, catalog: &MetadataCatalog) -> Result<()> {
        let path = self.catalog_path();
        let temp_path = path.with_extension("json.tmp");
        let file = File::create(&temp_path).map_err(metadata_err)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, catalog)
            .map_err(|e| NodeError::Metadata(e.to_string()))?;
        fs::rename(&temp_path, &path).map_err(metadata_err)?;
        Ok(())
    }
}

impl MetadataStore for FileMetadataStore {
    fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(metadata_err)?;
        let path = self.catalog_path();
        if path.exists() {
            let file = File::open(&path).map_err(metadata_err)?;
            let loaded: MetadataCatalog = serde_json::from_reader(file).map_err(|e| {
                NodeError::Metadata(format!(
                    "failed to parse tablespace catalog '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            *self.catalog.write().expect("metadata lock poisoned") = loaded;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn ensure_default_table_space(&self, node_id: &str) -> Result<()> {
        let mut catalog = self.catalog.write().expect("metadata lock poisoned");
        if catalog.table_spaces.contains_key(DEFAULT_TABLE_SPACE) {
            return Ok(());
        }
        catalog.table_spaces.insert(
            DEFAULT_TABLE_SPACE.to_string(),
            TableSpaceDescriptor::single_node(DEFAULT_TABLE_SPACE, node_id),
        );
        self.save(&catalog)
    }

    fn list_table_spaces(&self) -> Result<BTreeSet<String>> {
        let catalog = self.catalog.read().expect("metadata lock poisoned");
        Ok(catalog.table_spaces.keys().cloned().collect())
    }

    fn describe(&self, name: &str) -> Result<TableSpaceDescriptor> {
        let catalog = self.catalog.read().expect("metadata lock poisoned");
        catalog
            .table_spaces
            .get(name)
            .cloned()
            .ok_or_else(|| NodeError::Metadata(format!("tablespace '{}' is not registered", name)))
    }

    fn register(&self, descriptor: TableSpaceDescriptor) -> Result<()> {
        let mut catalog = self.catalog.write().expect("metadata lock poisoned");
        if catalog.table_spaces.contains_key(&descriptor.name) {
            return Err(NodeError::already_exists("Tablespace", &descriptor.name));
        }
        catalog
            .table_spaces
            .insert(descriptor.name.clone(), descriptor);
        self.save(&catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_catalog_survives_restart() {
        let dir = tempdir().unwrap();

        let store = FileMetadataStore::new(dir.path().to_path_buf());
        store.start().unwrap();
        store.ensure_default_table_space("n1").unwrap();
        store
            .register(TableSpaceDescriptor::single_node("ts2", "n1"))
            .unwrap();
        store.close().unwrap();

        let reopened = FileMetadataStore::new(dir.path().to_path_buf());
        reopened.start().unwrap();
        let spaces = reopened.list_table_spaces().unwrap();
        assert!(spaces.contains("default"));
        assert!(spaces.contains("ts2"));
        assert_eq!(reopened.describe("ts2").unwrap().leader, "n1");
    }

    #[test]
    fn test_register_duplicate_fails_and_keeps_catalog() {
        let dir = tempdir().unwrap();
        let store = FileMetadataStore::new(dir.path().to_path_buf());
        store.start().unwrap();

        store
            .register(TableSpaceDescriptor::single_node("ts1", "n1"))
            .unwrap();
        assert!(store
            .register(TableSpaceDescriptor::single_node("ts1", "n2"))
            .is_err());
        assert_eq!(store.describe("ts1").unwrap().leader, "n1");
    }

    #[test]
    fn test_start_on_empty_dir_is_fresh() {
        let dir = tempdir().unwrap();
        let store = FileMetadataStore::new(dir.path().join("meta"));
        store.start().unwrap();
        assert!(store.list_table_spaces().unwrap().is_empty());
    }
}
