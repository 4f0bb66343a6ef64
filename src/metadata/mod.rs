//! Cluster metadata
//!
//! The metadata store is the cluster-wide catalog of tablespaces and
//! their replica assignments. The node manager only ever holds read
//! copies of descriptors; ownership stays with the store.

pub mod file;
pub mod memory;

pub use file::FileMetadataStore;
pub use memory::MemoryMetadataStore;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

/// Name of the tablespace every node ensures at startup
pub const DEFAULT_TABLE_SPACE: &str = "default";

/// Cluster-level record of a tablespace: identity, leader, replica set.
///
/// Invariants (enforced by the builder): `leader` is a member of
/// `replicas`, and `replicas` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpaceDescriptor {
    pub name: String,
    pub leader: String,
    pub replicas: BTreeSet<String>,
}

impl TableSpaceDescriptor {
    pub fn builder() -> TableSpaceDescriptorBuilder {
        TableSpaceDescriptorBuilder::default()
    }

    /// Descriptor for a tablespace hosted and led by a single node
    pub fn single_node(name: &str, node_id: &str) -> Self {
        Self {
            name: name.to_string(),
            leader: node_id.to_string(),
            replicas: [node_id.to_string()].into(),
        }
    }

    pub fn is_replica(&self, node_id: &str) -> bool {
        self.replicas.contains(node_id)
    }
}

/// Builder validating the descriptor invariants before anything touches
/// the catalog
#[derive(Debug, Default)]
pub struct TableSpaceDescriptorBuilder {
    name: Option<String>,
    leader: Option<String>,
    replicas: BTreeSet<String>,
}

impl TableSpaceDescriptorBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn leader(mut self, leader: impl Into<String>) -> Self {
        self.leader = Some(leader.into());
        self
    }

    pub fn replica(mut self, node_id: impl Into<String>) -> Self {
        self.replicas.insert(node_id.into());
        self
    }

    pub fn replicas<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replicas.extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> Result<TableSpaceDescriptor> {
        let name = match self.name {
            Some(n) if !n.is_empty() => n,
            _ => {
                return Err(NodeError::InvalidStatement(
                    "tablespace name must not be empty".into(),
                ))
            }
        };
        if self.replicas.is_empty() {
            return Err(NodeError::InvalidStatement(format!(
                "tablespace '{}' must have at least one replica",
                name
            )));
        }
        let leader = match self.leader {
            Some(l) if !l.is_empty() => l,
            _ => {
                return Err(NodeError::InvalidStatement(format!(
                    "tablespace '{}' must have a leader",
                    name
                )))
            }
        };
        if !self.replicas.contains(&leader) {
            return Err(NodeError::InvalidStatement(format!(
                "leader '{}' of tablespace '{}' is not in the replica set",
                leader, name
            )));
        }
        Ok(TableSpaceDescriptor {
            name,
            leader,
            replicas: self.replicas,
        })
    }
}

/// Cluster-wide catalog of tablespaces.
///
/// Shared by the node manager and the activator; its lifecycle is tied
/// to the node (`start` on node start, `close` during activator
/// shutdown).
pub trait MetadataStore: Send + Sync {
    fn start(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    /// Make sure the default tablespace exists with this node as a
    /// replica. Idempotent.
    fn ensure_default_table_space(&self, node_id: &str) -> Result<()>;

    /// Names of every registered tablespace
    fn list_table_spaces(&self) -> Result<BTreeSet<String>>;

    /// Descriptor of one tablespace; fails if it is not registered
    fn describe(&self, name: &str) -> Result<TableSpaceDescriptor>;

    /// Register a new tablespace. Atomic; fails on duplicate names.
    fn register(&self, descriptor: TableSpaceDescriptor) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_happy_path() {
        let descriptor = TableSpaceDescriptor::builder()
            .name("ts1")
            .leader("n1")
            .replica("n1")
            .replica("n2")
            .build()
            .unwrap();
        assert_eq!(descriptor.name, "ts1");
        assert_eq!(descriptor.leader, "n1");
        assert!(descriptor.is_replica("n2"));
        assert!(!descriptor.is_replica("n3"));
    }

    #[test]
    fn test_builder_rejects_leader_outside_replicas() {
        let err = TableSpaceDescriptor::builder()
            .name("ts1")
            .leader("n9")
            .replica("n1")
            .build()
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidStatement(_)));
    }

    #[test]
    fn test_builder_rejects_empty_replicas() {
        let err = TableSpaceDescriptor::builder()
            .name("ts1")
            .leader("n1")
            .build()
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidStatement(_)));
    }

    #[test]
    fn test_builder_rejects_missing_name() {
        let err = TableSpaceDescriptor::builder()
            .leader("n1")
            .replica("n1")
            .build()
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidStatement(_)));
    }

    #[test]
    fn test_single_node_descriptor_is_valid() {
        let descriptor = TableSpaceDescriptor::single_node("default", "n1");
        assert_eq!(descriptor.leader, "n1");
        assert!(descriptor.is_replica("n1"));
    }
}
