//! Flag-based cooperative termination for worker threads
//!
//! The platform-independent counterpart to signal-based stopping: the
//! worker's target runs on an auxiliary thread and polls a shared stop
//! flag. A supervising loop watches the flag and the thread's liveness
//! at a fixed beat; on a stop request or natural completion it first
//! drains the worker's nested child registry, then reports the worker
//! stopped. The thread itself is never joined, so a target that ignores
//! the flag cannot block process exit.

use super::registry::ChildRegistry;
use super::{next_child_id, Terminable};
use crate::error::ProcessError;
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Shared cooperative stop flag polled by a worker target
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stop has been requested
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Request a stop; idempotent
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A worker thread that can be asked to stop cooperatively
///
/// Built by [`GracefulWorker::spawn`]; must be constructed inside a
/// tokio runtime because the supervising loop runs as a tokio task.
#[derive(Debug)]
pub struct GracefulWorker {
    id: u64,
    name: String,
    flag: StopFlag,
    done_rx: watch::Receiver<bool>,
}

impl GracefulWorker {
    /// Run `target` on an auxiliary thread, supervised at `beat`
    ///
    /// The target receives the worker's [`StopFlag`] and is expected to
    /// poll it at its own convenient points. `nested` holds any children
    /// the target spawns; it is drained before the worker is reported
    /// stopped.
    pub fn spawn<F>(
        name: &str,
        beat: Duration,
        nested: Arc<ChildRegistry>,
        target: F,
    ) -> Result<Arc<Self>>
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        let flag = StopFlag::new();
        let (done_tx, done_rx) = watch::channel(false);

        let target_flag = flag.clone();
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || target(target_flag))
            .map_err(|e| ProcessError::Spawn(format!("Failed to spawn worker thread: {}", e)))?;

        let worker = Arc::new(Self {
            id: next_child_id(),
            name: name.to_string(),
            flag: flag.clone(),
            done_rx,
        });

        let worker_name = name.to_string();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(beat).await;
                if flag.is_set() {
                    debug!(worker = %worker_name, "stop flag observed");
                    break;
                }
                if thread.is_finished() {
                    debug!(worker = %worker_name, "worker target completed");
                    break;
                }
            }
            // Children first, so exiting is clean even while the target
            // is still winding down.
            nested.drain_all().await;
            let _ = done_tx.send(true);
        });

        Ok(worker)
    }

    /// The stop flag handed to the target
    pub fn stop_flag(&self) -> StopFlag {
        self.flag.clone()
    }
}

#[async_trait]
impl Terminable for GracefulWorker {
    fn child_id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn request_stop(&self) -> Result<()> {
        self.flag.set();
        Ok(())
    }

    async fn await_stopped(&self) -> Result<()> {
        let mut rx = self.done_rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return Ok(());
            }
            if rx.changed().await.is_err() {
                return Ok(());
            }
        }
    }
}

/// A group of graceful workers stopped and drained as one unit
///
/// The pool itself is [`Terminable`], so it can live in a
/// [`ChildRegistry`] next to individual processes.
#[derive(Debug)]
pub struct WorkerPool {
    id: u64,
    name: String,
    beat: Duration,
    workers: Mutex<Vec<Arc<GracefulWorker>>>,
}

impl WorkerPool {
    /// Create an empty pool supervising workers at `beat`
    pub fn new(name: &str, beat: Duration) -> Self {
        Self {
            id: next_child_id(),
            name: name.to_string(),
            beat,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a worker into the pool
    pub fn spawn<F>(&self, name: &str, target: F) -> Result<Arc<GracefulWorker>>
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        let worker = GracefulWorker::spawn(
            name,
            self.beat,
            Arc::new(ChildRegistry::new()),
            target,
        )?;
        self.lock_workers().push(Arc::clone(&worker));
        Ok(worker)
    }

    /// Number of workers ever spawned and not yet drained
    pub fn len(&self) -> usize {
        self.lock_workers().len()
    }

    /// Whether the pool holds no workers
    pub fn is_empty(&self) -> bool {
        self.lock_workers().is_empty()
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<Arc<GracefulWorker>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Terminable for WorkerPool {
    fn child_id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn request_stop(&self) -> Result<()> {
        let workers: Vec<_> = self.lock_workers().clone();
        for worker in workers {
            if let Err(e) = worker.request_stop().await {
                warn!(worker = worker.name(), error = %e, "failed to stop pool worker");
            }
        }
        Ok(())
    }

    async fn await_stopped(&self) -> Result<()> {
        loop {
            let worker = self.lock_workers().pop();
            let Some(worker) = worker else { break };
            worker.await_stopped().await?;
        }
        Ok(())
    }
}
