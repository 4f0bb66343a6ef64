//! Basalt - node-level control plane for a distributed SQL database
//!
//! A Basalt node owns the set of tablespaces hosted locally: it boots
//! them from persistent metadata, routes statements to the right
//! tablespace, reconciles local state against the cluster catalog, and
//! shuts everything down in order.
//!
//! Architecture Overview:
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ execute_statement / wait_for_*
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Node Manager                           │
//! │   (registry of tablespaces, activator thread, worker pool)  │
//! └─────────────────────────────────────────────────────────────┘
//!            │ shared-lock lookup          ▲ reconciliation
//!            ▼                             │
//! ┌──────────────────────────┐   ┌─────────────────────────────┐
//! │   Tablespace Managers    │   │       Metadata Store        │
//! │ (one per hosted space,   │   │ (cluster-wide catalog of    │
//! │  each owns its own WAL)  │   │  tablespaces and replicas)  │
//! └──────────────────────────┘   └─────────────────────────────┘
//!            │
//!     ┌──────┴───────┐
//!     ▼              ▼
//! ┌─────────┐   ┌────────────┐
//! │ Commit  │   │ Page Store │
//! │  Logs   │   │  (shared)  │
//! └─────────┘   └────────────┘
//! ```
//!
//! The collaborator contracts ([`metadata::MetadataStore`],
//! [`wal::LogManager`], [`storage::PageStore`],
//! [`tablespace::TableSpaceManager`]) are the extension points for
//! local versus clustered deployments; in-memory and file-backed
//! implementations ship with the crate.

pub mod codec;
pub mod error;
pub mod metadata;
pub mod node;
pub mod statement;
pub mod storage;
pub mod tablespace;
pub mod wal;

pub use error::{NodeError, Result};
pub use node::NodeManager;
pub use statement::{
    DdlResult, DmlResult, GetResult, Statement, StatementBody, StatementResult, NO_TRANSACTION,
};
