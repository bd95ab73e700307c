//! Fan-out task orchestration.
//!
//! Units are blocking closures (libssh2 calls) run on a dedicated tokio
//! runtime through `spawn_blocking`. Every unit is counted in one
//! orchestrator-wide `Outstanding` counter, which backs the global
//! `wait_all` barrier. Callers that only care about the units they launched
//! collect the handles in a `Batch` and `join` it.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    fn enter(self: &Arc<Self>) -> OutstandingGuard {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        OutstandingGuard {
            outstanding: Arc::clone(self),
        }
    }

    fn current(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Decrements the counter when dropped, so a unit that fails or panics is
/// still accounted for.
struct OutstandingGuard {
    outstanding: Arc<Outstanding>,
}

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        let mut count = self
            .outstanding
            .count
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.outstanding.idle.notify_all();
        }
    }
}

/// Handles of the units launched by one fan-out call.
pub struct Batch<T> {
    handles: Vec<(String, JoinHandle<Option<T>>)>,
}

impl<T> Batch<T> {
    pub fn new() -> Self {
        Batch {
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, label: String, handle: JoinHandle<Option<T>>) {
        self.handles.push((label, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TaskOrchestrator {
    runtime: Runtime,
    outstanding: Arc<Outstanding>,
    limit: Option<Arc<Semaphore>>,
}

impl TaskOrchestrator {
    /// `max_parallel` caps how many units execute at the same time; `None`
    /// launches every unit immediately.
    pub fn new(max_parallel: Option<usize>) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .thread_name("mssh-worker")
            .enable_all()
            .build()
            .context("failed to create tokio runtime")?;
        Ok(TaskOrchestrator {
            runtime,
            outstanding: Arc::new(Outstanding::default()),
            limit: max_parallel
                .filter(|n| *n > 0)
                .map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    /// Launch one unit. The returned handle resolves to `None` when the unit
    /// panicked.
    pub fn launch<T, F>(&self, label: &str, work: F) -> JoinHandle<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let guard = self.outstanding.enter();
        let limit = self.limit.clone();
        let label = label.to_string();
        self.runtime.spawn(async move {
            let _guard = guard;
            let _permit = match limit {
                Some(sem) => sem.acquire_owned().await.ok(),
                None => None,
            };
            match tokio::task::spawn_blocking(work).await {
                Ok(value) => Some(value),
                Err(e) => {
                    log::error!("[{label}] task aborted: {e}");
                    None
                }
            }
        })
    }

    /// Wait for every unit of `batch`, returning their results in launch
    /// order. Units that panicked are skipped.
    pub fn join<T>(&self, batch: Batch<T>) -> Vec<T> {
        self.runtime.block_on(async move {
            let mut results = Vec::with_capacity(batch.len());
            for (label, handle) in batch.handles {
                match handle.await {
                    Ok(Some(value)) => results.push(value),
                    Ok(None) => {}
                    Err(e) => log::error!("[{label}] task join failed: {e}"),
                }
            }
            results
        })
    }

    /// Global barrier: block until no launched unit is outstanding, whoever
    /// launched it.
    pub fn wait_all(&self) {
        self.outstanding.wait_idle();
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.current()
    }
}
