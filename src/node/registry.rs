//! Tablespace registry
//!
//! Plain map from tablespace name to its live manager. The map itself
//! is not synchronized: it lives inside the node's general
//! readers-writer lock. Lookups and snapshots run under the shared
//! lock; insertion and removal only ever happen under the exclusive
//! lock (activator boot/eviction and node shutdown).
//!
//! Invariant: every manager in the registry has completed `start`
//! successfully before being inserted.

use std::collections::HashMap;
use std::sync::Arc;

use crate::tablespace::TableSpaceManager;

#[derive(Default)]
pub struct TableSpaceRegistry {
    spaces: HashMap<String, Arc<dyn TableSpaceManager>>,
}

impl TableSpaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn TableSpaceManager>> {
        self.spaces.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.spaces.contains_key(name)
    }

    pub fn insert(&mut self, name: String, manager: Arc<dyn TableSpaceManager>) {
        self.spaces.insert(name, manager);
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn TableSpaceManager>> {
        self.spaces.remove(name)
    }

    /// Managers by value, so iteration needs no further locking
    pub fn snapshot(&self) -> Vec<Arc<dyn TableSpaceManager>> {
        self.spaces.values().cloned().collect()
    }

    /// Remove and return everything; used during orderly shutdown
    pub fn drain(&mut self) -> Vec<(String, Arc<dyn TableSpaceManager>)> {
        self.spaces.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}
