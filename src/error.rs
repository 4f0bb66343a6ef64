//! Error types for Basalt
//!
//! Defines a unified error type that can represent failures from all
//! collaborators of the node manager. Each subsystem maps onto one
//! variant so callers can tell a catalog outage apart from a WAL outage
//! or a statement-level problem.

use std::fmt;
use std::io;

/// Unified error type for node-level operations
#[derive(Debug)]
pub enum NodeError {
    /// I/O error (file operations)
    Io(io::Error),
    /// Cluster catalog access failed; reconciliation retries on next wakeup
    Metadata(String),
    /// WAL write, recover, or close failed; fatal to the owning tablespace
    Log(String),
    /// Page I/O failed
    Storage(String),
    /// DDL semantically invalid or conflicting
    Ddl(String),
    /// Malformed statement: missing tablespace, transactional
    /// CreateTableSpace, bad descriptor
    InvalidStatement(String),
    /// Tablespace not hosted on this node
    NoSuchTableSpace(String),
    /// Runtime error during statement execution
    Execution(String),
    /// JSON-related error (catalogs, checkpoint markers)
    Json(String),
}

impl NodeError {
    /// Error for a statement routed to a tablespace this node does not host
    pub fn no_such_table_space(name: &str) -> Self {
        NodeError::NoSuchTableSpace(format!("Tablespace '{}' is not available on this node", name))
    }

    /// Error for a table reference the tablespace does not know
    pub fn table_not_found(table: &str) -> Self {
        NodeError::Execution(format!("Table '{}' doesn't exist", table))
    }

    /// Error for a DDL that collides with an existing object
    pub fn already_exists(what: &str, name: &str) -> Self {
        NodeError::Ddl(format!("{} '{}' already exists", what, name))
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Io(e) => write!(f, "{}", e),
            NodeError::Metadata(msg) => write!(f, "metadata unavailable: {}", msg),
            NodeError::Log(msg) => write!(f, "log unavailable: {}", msg),
            NodeError::Storage(msg) => write!(f, "storage unavailable: {}", msg),
            NodeError::Ddl(msg) => write!(f, "{}", msg),
            NodeError::InvalidStatement(msg) => write!(f, "{}", msg),
            NodeError::NoSuchTableSpace(msg) => write!(f, "{}", msg),
            NodeError::Execution(msg) => write!(f, "{}", msg),
            NodeError::Json(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<io::Error> for NodeError {
    fn from(e: io::Error) -> Self {
        NodeError::Io(e)
    }
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Json(e.to_string())
    }
}

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
