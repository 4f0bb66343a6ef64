//! Background worker pool
//!
//! An unbounded pool of short-lived tasks used by tablespaces for
//! asynchronous work (checkpoints, catalog refreshes). Tasks are not
//! guaranteed to run once shutdown has begun; rejected tasks are
//! logged and dropped. Workers must not retain references to the node
//! manager past their own completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;

/// Pool spawning one short-lived thread per task
#[derive(Default)]
pub struct WorkerPool {
    shutting_down: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a task to the pool. Returns false (and logs) if the pool
    /// is shutting down.
    pub fn submit<F>(&self, name: &str, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut workers = self.workers.lock().expect("worker pool lock poisoned");
        if self.shutting_down.load(Ordering::Acquire) {
            log::warn!("worker pool is shutting down, dropping task '{}'", name);
            return false;
        }
        // Reap threads that already finished so the vector stays small
        workers.retain(|h| !h.is_finished());

        let handle = std::thread::spawn(task);
        workers.push(handle);
        true
    }

    /// Stop accepting tasks and wait for in-flight workers
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let handles = {
            let mut workers = self.workers.lock().expect("worker pool lock poisoned");
            std::mem::take(&mut *workers)
        };
        for handle in handles {
            if handle.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
    }
}
