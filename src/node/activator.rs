//! Activator loop
//!
//! One dedicated thread per node reconciles the local registry with
//! the cluster metadata. Wakeups arrive through a one-slot channel, so
//! any number of pokes before a pass collapse into a single pending
//! reconciliation: the only guarantee a caller gets is "at least one
//! pass fully follows my poke", and that is all callers need.
//!
//! One reconciliation pass:
//! 1. under the exclusive lock, boot every assigned tablespace that is
//!    missing from the registry
//! 2. without the lock, scan a snapshot for failed managers
//! 3. under the exclusive lock again, close and remove the failed ones
//!
//! Boot errors are logged and swallowed; the tablespace is retried on
//! the next wakeup. When the stop flag is set the loop exits and tears
//! down: every manager, then the log manager, then the page store,
//! then the metadata store.

use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::error::Result;
use crate::tablespace::TableSpaceManager;

use super::NodeInner;

pub(super) fn activator_loop(inner: Arc<NodeInner>, wakeups: Receiver<()>) {
    log::info!("activator for node '{}' started", inner.node_id);
    loop {
        if inner.stopped.load(Ordering::Acquire) {
            break;
        }
        // Channel disconnect means the node was dropped; treat as stop
        if wakeups.recv().is_err() {
            break;
        }
        if inner.stopped.load(Ordering::Acquire) {
            break;
        }
        reconcile(&inner);
    }
    shutdown(&inner);
    log::info!("activator for node '{}' stopped", inner.node_id);
}

/// One reconciliation pass
pub(super) fn reconcile(inner: &NodeInner) {
    // Phase 1: boot assigned-but-missing tablespaces. The exclusive
    // lock spans the whole boot so statement dispatch can never observe
    // a manager whose `start` has not finished.
    {
        let mut registry = inner.registry.write().expect("registry lock poisoned");
        let assigned = match inner.metadata.list_table_spaces() {
            Ok(assigned) => assigned,
            Err(e) => {
                log::error!("reconciliation could not list tablespaces: {}", e);
                return;
            }
        };
        for name in assigned {
            if registry.contains(&name) {
                continue;
            }
            match boot_table_space(inner, &name) {
                Ok(Some(manager)) => {
                    log::info!("tablespace '{}' booted on node '{}'", name, inner.node_id);
                    registry.insert(name, manager);
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("boot of tablespace '{}' failed, will retry: {}", name, e);
                }
            }
        }
    }

    // Phase 2: detect failures without holding the lock
    let failed: Vec<String> = {
        let registry = inner.registry.read().expect("registry lock poisoned");
        registry
            .snapshot()
            .iter()
            .filter(|m| m.is_failed())
            .map(|m| m.name().to_string())
            .collect()
    };

    // Phase 3: evict. `is_failed` is sticky, so no re-check is needed.
    if !failed.is_empty() {
        let mut registry = inner.registry.write().expect("registry lock poisoned");
        for name in failed {
            if let Some(manager) = registry.remove(&name) {
                if let Err(e) = manager.close() {
                    log::error!("error closing failed tablespace '{}': {}", name, e);
                }
                log::warn!("tablespace '{}' evicted after failure", name);
            }
        }
    }
}

/// Boot one tablespace. Returns `Ok(None)` when this node is not a
/// replica. The returned manager has completed `start`.
fn boot_table_space(inner: &NodeInner, name: &str) -> Result<Option<Arc<dyn TableSpaceManager>>> {
    let descriptor = inner.metadata.describe(name)?;
    if !descriptor.is_replica(&inner.node_id) {
        log::debug!("tablespace '{}' is not assigned to node '{}'", name, inner.node_id);
        return Ok(None);
    }

    let log = inner.logs.create_log(name)?;
    let manager = inner
        .factory
        .create(&descriptor, log, Arc::clone(&inner.runtime))?;

    if let Err(e) = manager.start() {
        // Discard the partial manager; closing it closes its log
        if let Err(close_err) = manager.close() {
            log::warn!(
                "error discarding partially booted tablespace '{}': {}",
                name,
                close_err
            );
        }
        return Err(e);
    }
    Ok(Some(manager))
}

/// Orderly teardown, run exactly once when the loop exits. Every close
/// is attempted even if earlier ones failed.
fn shutdown(inner: &NodeInner) {
    let mut registry = inner.registry.write().expect("registry lock poisoned");
    let managers = registry.drain();
    log::info!(
        "node '{}' shutting down, closing {} tablespaces",
        inner.node_id,
        managers.len()
    );
    for (name, manager) in managers {
        if let Err(e) = manager.close() {
            log::error!("error closing tablespace '{}': {}", name, e);
        }
    }
    if let Err(e) = inner.logs.close() {
        log::error!("error closing log manager: {}", e);
    }
    if let Err(e) = inner.pages.close() {
        log::error!("error closing page store: {}", e);
    }
    if let Err(e) = inner.metadata.close() {
        log::error!("error closing metadata store: {}", e);
    }
}
