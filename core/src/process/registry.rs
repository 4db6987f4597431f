//! Process-wide child registry and resource context
//!
//! The registry guarantees every registered child is stopped before the
//! hosting process exits. It is shared between the lifecycle task, the
//! exit-signal handler and worker supervising loops, so every access goes
//! through the internal lock.

use super::worker::WorkerPool;
use super::Terminable;
use crate::config::CoreConfig;
use crate::error::ProcessError;
use crate::Result;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Lock-protected set of terminable children
///
/// `register` is idempotent per child id and `unregister` of an absent
/// child is a no-op. The registry owns no restart semantics.
#[derive(Default)]
pub struct ChildRegistry {
    children: Mutex<Vec<Arc<dyn Terminable>>>,
}

impl ChildRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a child for cleanup; a second registration of the same
    /// child id is a no-op
    pub fn register(&self, child: Arc<dyn Terminable>) {
        let mut children = self.lock_children();
        if children.iter().any(|c| c.child_id() == child.child_id()) {
            debug!(child = child.name(), "child already registered");
            return;
        }
        children.push(child);
    }

    /// Remove a child from the registry without stopping it; absent
    /// children are ignored
    pub fn unregister(&self, child_id: u64) {
        self.lock_children().retain(|c| c.child_id() != child_id);
    }

    /// Look up a registered child by id
    pub fn get(&self, child_id: u64) -> Result<Arc<dyn Terminable>> {
        self.lock_children()
            .iter()
            .find(|c| c.child_id() == child_id)
            .cloned()
            .ok_or_else(|| ProcessError::UnknownChild(child_id).into())
    }

    /// Number of registered children
    pub fn len(&self) -> usize {
        self.lock_children().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.lock_children().is_empty()
    }

    /// Stop every registered child, most recently registered first,
    /// draining the registry to empty
    ///
    /// Errors from already-dead children are swallowed with a warning:
    /// the desired end state, absence, is already achieved.
    pub async fn drain_all(&self) {
        loop {
            // Pop under the lock, stop outside it: stopping can suspend
            // and a child may itself touch the registry while exiting.
            let child = self.lock_children().pop();
            let Some(child) = child else { break };

            debug!(child = child.name(), "stopping registered child");
            if let Err(e) = child.request_stop().await {
                warn!(child = child.name(), error = %e, "failed to stop child during drain");
                continue;
            }
            if let Err(e) = child.await_stopped().await {
                warn!(child = child.name(), error = %e, "failed to wait for child during drain");
            }
        }
    }

    fn lock_children(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Terminable>>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Explicit owner of process-wide supervision resources
///
/// Constructed once at process start and passed by `Arc` to every
/// consumer; replaces lazily-initialized module-level singletons. The
/// worker pool is created on first use and obtaining it is idempotent.
pub struct ProcessContext {
    config: CoreConfig,
    registry: Arc<ChildRegistry>,
    pool: Mutex<Option<Arc<WorkerPool>>>,
}

impl ProcessContext {
    /// Create the context with its (empty) registry
    pub fn new(config: CoreConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: Arc::new(ChildRegistry::new()),
            pool: Mutex::new(None),
        })
    }

    /// Core configuration this context was built with
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The process-wide child registry
    pub fn registry(&self) -> Arc<ChildRegistry> {
        Arc::clone(&self.registry)
    }

    /// The process-wide worker pool, created and registered for cleanup
    /// on first call; later calls return the same instance
    pub fn worker_pool(&self) -> Arc<WorkerPool> {
        let mut slot = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = slot.as_ref() {
            return Arc::clone(pool);
        }
        let pool = Arc::new(WorkerPool::new("worker-pool", self.config.beat_interval()));
        self.registry.register(pool.clone());
        *slot = Some(Arc::clone(&pool));
        pool
    }

    /// Stop and drain everything owned by this context
    pub async fn shutdown(&self) {
        self.registry.drain_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test double counting stop calls
    #[derive(Debug)]
    struct CountingChild {
        id: u64,
        name: String,
        stops: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<u64>>>,
    }

    #[async_trait]
    impl Terminable for CountingChild {
        fn child_id(&self) -> u64 {
            self.id
        }

        fn name(&self) -> &str {
            &self.name
        }

        async fn request_stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.id);
            Ok(())
        }

        async fn await_stopped(&self) -> Result<()> {
            Ok(())
        }
    }

    fn make_child(
        id: u64,
        stops: &Arc<AtomicUsize>,
        order: &Arc<Mutex<Vec<u64>>>,
    ) -> Arc<CountingChild> {
        Arc::new(CountingChild {
            id,
            name: format!("child-{id}"),
            stops: Arc::clone(stops),
            order: Arc::clone(order),
        })
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = ChildRegistry::new();
        let stops = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let child = make_child(1, &stops, &order);

        registry.register(child.clone());
        registry.register(child.clone());
        assert_eq!(registry.len(), 1);

        registry.drain_all().await;
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_absent_is_noop() {
        let registry = ChildRegistry::new();
        registry.unregister(42);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_drain_all_stops_each_child_once_lifo() {
        let registry = ChildRegistry::new();
        let stops = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in [1, 2, 3] {
            registry.register(make_child(id, &stops, &order));
        }

        registry.drain_all().await;
        assert!(registry.is_empty());
        assert_eq!(stops.load(Ordering::SeqCst), 3);
        // Most recently registered first.
        assert_eq!(*order.lock().unwrap(), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_drain_swallows_stop_errors() {
        #[derive(Debug)]
        struct BrokenChild;

        #[async_trait]
        impl Terminable for BrokenChild {
            fn child_id(&self) -> u64 {
                99
            }

            fn name(&self) -> &str {
                "broken"
            }

            async fn request_stop(&self) -> Result<()> {
                Err(ProcessError::Signal("already gone".to_string()).into())
            }

            async fn await_stopped(&self) -> Result<()> {
                Ok(())
            }
        }

        let registry = ChildRegistry::new();
        registry.register(Arc::new(BrokenChild));
        registry.drain_all().await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_child() {
        let registry = ChildRegistry::new();
        let err = registry.get(7).unwrap_err();
        assert_eq!(err.code(), "PROC004");
    }

    #[tokio::test]
    async fn test_worker_pool_is_idempotent_and_registered() {
        let ctx = ProcessContext::new(CoreConfig::default());
        let a = ctx.worker_pool();
        let b = ctx.worker_pool();
        assert!(Arc::ptr_eq(&a, &b));
        // The pool registered itself for process-wide cleanup.
        assert_eq!(ctx.registry().len(), 1);

        ctx.shutdown().await;
        assert!(ctx.registry().is_empty());
    }
}
