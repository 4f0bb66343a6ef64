//! In-memory metadata store
//!
//! Single-node catalog used by tests and standalone deployments. A
//! clustered deployment would replace this with a replicated store
//! behind the same trait.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::error::{NodeError, Result};

use super::{MetadataStore, TableSpaceDescriptor, DEFAULT_TABLE_SPACE};

/// Metadata store keeping descriptors in process memory
#[derive(Default)]
pub struct MemoryMetadataStore {
    spaces: RwLock<BTreeMap<String, TableSpaceDescriptor>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn ensure_default_table_space(&self, node_id: &str) -> Result<()> {
        let mut spaces = self.spaces.write().expect("metadata lock poisoned");
        if !spaces.contains_key(DEFAULT_TABLE_SPACE) {
            spaces.insert(
                DEFAULT_TABLE_SPACE.to_string(),
                TableSpaceDescriptor::single_node(DEFAULT_TABLE_SPACE, node_id),
            );
        }
        Ok(())
    }

    fn list_table_spaces(&self) -> Result<BTreeSet<String>> {
        let spaces = self.spaces.read().expect("metadata lock poisoned");
        Ok(spaces.keys().cloned().collect())
    }

    fn describe(&self, name: &str) -> Result<TableSpaceDescriptor> {
        let spaces = self.spaces.read().expect("metadata lock poisoned");
        spaces
            .get(name)
            .cloned()
            .ok_or_else(|| NodeError::Metadata(format!("tablespace '{}' is not registered", name)))
    }

    fn register(&self, descriptor: TableSpaceDescriptor) -> Result<()> {
        let mut spaces = self.spaces.write().expect("metadata lock poisoned");
        if spaces.contains_key(&descriptor.name) {
            return Err(NodeError::already_exists("Tablespace", &descriptor.name));
        }
        spaces.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_default_is_idempotent() {
        let store = MemoryMetadataStore::new();
        store.ensure_default_table_space("n1").unwrap();
        store.ensure_default_table_space("n1").unwrap();

        let spaces = store.list_table_spaces().unwrap();
        assert_eq!(spaces.len(), 1);
        assert!(spaces.contains(DEFAULT_TABLE_SPACE));

        let descriptor = store.describe(DEFAULT_TABLE_SPACE).unwrap();
        assert!(descriptor.is_replica("n1"));
    }

    #[test]
    fn test_ensure_default_keeps_existing_assignment() {
        let store = MemoryMetadataStore::new();
        store.ensure_default_table_space("n1").unwrap();
        // A second node arriving later must not steal the default space
        store.ensure_default_table_space("n2").unwrap();
        let descriptor = store.describe(DEFAULT_TABLE_SPACE).unwrap();
        assert_eq!(descriptor.leader, "n1");
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let store = MemoryMetadataStore::new();
        store
            .register(TableSpaceDescriptor::single_node("ts1", "n1"))
            .unwrap();
        let err = store
            .register(TableSpaceDescriptor::single_node("ts1", "n2"))
            .unwrap_err();
        assert!(matches!(err, NodeError::Ddl(_)));
    }

    #[test]
    fn test_describe_missing_space_fails() {
        let store = MemoryMetadataStore::new();
        assert!(matches!(
            store.describe("nope"),
            Err(NodeError::Metadata(_))
        ));
    }
}
