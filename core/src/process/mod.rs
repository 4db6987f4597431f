//! Cooperative child supervision
//!
//! Everything that can be asked to stop cooperatively implements
//! [`Terminable`], independently of the underlying mechanism. Two
//! strategies exist, selected once at construction:
//!
//! - **Signal-based** ([`unix::GracefulChild`]): the child is an OS
//!   process in its own process group; stopping delivers SIGTERM to the
//!   group.
//! - **Flag-based** ([`worker::GracefulWorker`]): the target runs on an
//!   auxiliary thread; stopping sets a shared flag the supervising loop
//!   polls at the configured beat interval.
//!
//! Children live in a [`registry::ChildRegistry`] so they are all stopped
//! before the hosting process exits, whichever exit path is taken.

use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod registry;
#[cfg(unix)]
pub mod unix;
pub mod worker;

pub use registry::{ChildRegistry, ProcessContext};
#[cfg(unix)]
pub use unix::GracefulChild;
pub use worker::{GracefulWorker, StopFlag, WorkerPool};

static NEXT_CHILD_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-wide unique child id
pub(crate) fn next_child_id() -> u64 {
    NEXT_CHILD_ID.fetch_add(1, Ordering::Relaxed)
}

/// Something that can be asked to stop cooperatively
#[async_trait]
pub trait Terminable: Send + Sync + std::fmt::Debug {
    /// Registry identity; stable for the lifetime of the child
    fn child_id(&self) -> u64;

    /// Human-readable name used in diagnostics
    fn name(&self) -> &str;

    /// Ask the child to stop; idempotent
    async fn request_stop(&self) -> Result<()>;

    /// Wait until the underlying OS process or thread has exited
    async fn await_stopped(&self) -> Result<()>;
}
