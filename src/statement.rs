//! Statement taxonomy
//!
//! Every statement entering the node carries the tablespace it targets
//! and a transaction id (`0` means "no transaction"). The node manager
//! routes on the tablespace name and never interprets DML payloads
//! itself; only `CreateTableSpace` is handled at node level.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::RawKey;
use crate::error::{NodeError, Result};
use crate::storage::Record;

/// Transaction id meaning "auto-commit / no transaction"
pub const NO_TRANSACTION: u64 = 0;

/// A statement addressed to one tablespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    /// Target tablespace; routing key for the node manager
    pub table_space: String,
    /// Owning transaction, or [`NO_TRANSACTION`]
    pub transaction_id: u64,
    /// The operation payload
    pub body: StatementBody,
}

impl Statement {
    pub fn new(table_space: impl Into<String>, body: StatementBody) -> Self {
        Self {
            table_space: table_space.into(),
            transaction_id: NO_TRANSACTION,
            body,
        }
    }

    /// Attach a transaction id
    pub fn in_transaction(mut self, transaction_id: u64) -> Self {
        self.transaction_id = transaction_id;
        self
    }

    pub fn insert(space: impl Into<String>, table: impl Into<String>, key: RawKey, value: Bytes) -> Self {
        Self::new(space, StatementBody::Insert { table: table.into(), key, value })
    }

    pub fn update(space: impl Into<String>, table: impl Into<String>, key: RawKey, value: Bytes) -> Self {
        Self::new(space, StatementBody::Update { table: table.into(), key, value })
    }

    pub fn delete(space: impl Into<String>, table: impl Into<String>, key: RawKey) -> Self {
        Self::new(space, StatementBody::Delete { table: table.into(), key })
    }

    pub fn get(space: impl Into<String>, table: impl Into<String>, key: RawKey) -> Self {
        Self::new(space, StatementBody::Get { table: table.into(), key })
    }

    pub fn create_table(space: impl Into<String>, table: impl Into<String>) -> Self {
        Self::new(space, StatementBody::CreateTable { table: table.into() })
    }

    pub fn create_table_space(
        name: impl Into<String>,
        leader: impl Into<String>,
        replicas: BTreeSet<String>,
    ) -> Self {
        let name = name.into();
        Self::new(
            name.clone(),
            StatementBody::CreateTableSpace {
                name,
                leader: leader.into(),
                replicas,
            },
        )
    }
}

/// The operation carried by a [`Statement`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatementBody {
    /// Register a new tablespace in the cluster catalog. Executed by the
    /// node manager directly; never valid inside a transaction.
    CreateTableSpace {
        name: String,
        leader: String,
        replicas: BTreeSet<String>,
    },
    /// Create a table inside the target tablespace
    CreateTable { table: String },
    /// Drop a table from the target tablespace
    DropTable { table: String },
    /// Insert a record
    Insert { table: String, key: RawKey, value: Bytes },
    /// Overwrite an existing record
    Update { table: String, key: RawKey, value: Bytes },
    /// Delete a record
    Delete { table: String, key: RawKey },
    /// Point lookup
    Get { table: String, key: RawKey },
}

impl StatementBody {
    /// Short name used in logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            StatementBody::CreateTableSpace { .. } => "CREATE TABLESPACE",
            StatementBody::CreateTable { .. } => "CREATE TABLE",
            StatementBody::DropTable { .. } => "DROP TABLE",
            StatementBody::Insert { .. } => "INSERT",
            StatementBody::Update { .. } => "UPDATE",
            StatementBody::Delete { .. } => "DELETE",
            StatementBody::Get { .. } => "GET",
        }
    }
}

/// Result of a DDL statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlResult {
    /// Transaction the DDL ran in, or [`NO_TRANSACTION`]
    pub transaction_id: u64,
}

/// Result of a DML statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmlResult {
    /// Number of records touched
    pub update_count: u64,
    /// Key of the touched record, when there is exactly one
    pub key: Option<RawKey>,
}

/// Result of a point lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResult {
    /// The found record, if any
    pub record: Option<Record>,
}

/// Tagged result matching the statement kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementResult {
    Ddl(DdlResult),
    Dml(DmlResult),
    Get(GetResult),
}

impl StatementResult {
    /// Assert the DML shape
    pub fn into_dml(self) -> Result<DmlResult> {
        match self {
            StatementResult::Dml(r) => Ok(r),
            other => Err(NodeError::Execution(format!(
                "expected a DML result, got {:?}",
                other
            ))),
        }
    }

    /// Assert the GET shape
    pub fn into_get(self) -> Result<GetResult> {
        match self {
            StatementResult::Get(r) => Ok(r),
            other => Err(NodeError::Execution(format!(
                "expected a GET result, got {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_defaults_to_no_transaction() {
        let stmt = Statement::get("ts1", "users", RawKey::from_i64(1));
        assert_eq!(stmt.transaction_id, NO_TRANSACTION);
        assert_eq!(stmt.table_space, "ts1");
    }

    #[test]
    fn test_in_transaction_sets_id() {
        let stmt = Statement::get("ts1", "users", RawKey::from_i64(1)).in_transaction(7);
        assert_eq!(stmt.transaction_id, 7);
    }

    #[test]
    fn test_create_table_space_targets_itself() {
        let replicas: BTreeSet<String> = ["n1".to_string()].into();
        let stmt = Statement::create_table_space("ts2", "n1", replicas);
        assert_eq!(stmt.table_space, "ts2");
        assert_eq!(stmt.body.kind(), "CREATE TABLESPACE");
    }

    #[test]
    fn test_result_shape_assertions() {
        let dml = StatementResult::Dml(DmlResult { update_count: 1, key: None });
        assert!(dml.clone().into_dml().is_ok());
        assert!(dml.into_get().is_err());

        let get = StatementResult::Get(GetResult { record: None });
        assert!(get.clone().into_get().is_ok());
        assert!(get.into_dml().is_err());
    }
}
