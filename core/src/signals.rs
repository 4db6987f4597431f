//! Process-wide exit signal handling
//!
//! Installed once per OS process. The handler is the backstop that
//! guarantees registered children are stopped even when the cooperative
//! shutdown sequence is never reached: on an exit signal it drains the
//! child registry and terminates the process with a success status (a
//! controlled shutdown following an interrupt is not a failure for
//! orchestration tooling watching the exit code).
//!
//! While a state machine runs with signal handling enabled it owns the
//! exit signals and the backstop stands down; see
//! [`StateMachine::run`](crate::lifecycle::StateMachine::run).

use crate::process::ChildRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Role of the current OS process in the supervision tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// The designated orchestrating process; reacts to interrupt and
    /// terminate
    Main,
    /// A spawned worker process; interrupt is ignored (workers are
    /// stopped explicitly by their owner), terminate still cleans up
    Worker,
}

static INSTALLED: AtomicBool = AtomicBool::new(false);
static COOPERATIVE: AtomicBool = AtomicBool::new(false);

/// Whether the exit handler has been installed in this process
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::SeqCst)
}

/// Whether a cooperative shutdown owner currently holds the exit signals
pub fn cooperative_shutdown_active() -> bool {
    COOPERATIVE.load(Ordering::SeqCst)
}

pub(crate) fn set_cooperative_shutdown(active: bool) {
    COOPERATIVE.store(active, Ordering::SeqCst);
}

/// Install the exit handler for this process; must be called from inside
/// a tokio runtime
///
/// A second call is a no-op: the first installation already owns signal
/// dispatch.
pub fn install(role: ProcessRole, registry: Arc<ChildRegistry>) {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        debug!("exit signal handler already installed");
        return;
    }

    #[cfg(unix)]
    if role == ProcessRole::Worker {
        // Safety: replacing the SIGINT disposition with SIG_IGN installs
        // no callback into Rust code.
        unsafe {
            let _ = nix::sys::signal::signal(
                nix::sys::signal::Signal::SIGINT,
                nix::sys::signal::SigHandler::SigIgn,
            );
        }
    }

    tokio::spawn(async move {
        loop {
            if wait_for_signal(role == ProcessRole::Main).await.is_err() {
                return;
            }
            if cooperative_shutdown_active() {
                debug!("exit signal deferred to cooperative shutdown owner");
                continue;
            }
            info!("exit signal received, stopping registered children");
            registry.drain_all().await;
            std::process::exit(0);
        }
    });
}

/// Wait until this process receives an interrupt or terminate signal
///
/// Delivered through the runtime's signal streams, so a scheduler
/// blocked in a wait cannot swallow a terminate.
pub async fn wait_for_exit_signal() -> std::io::Result<()> {
    wait_for_signal(true).await
}

#[cfg(unix)]
async fn wait_for_signal(include_interrupt: bool) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    if include_interrupt {
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    } else {
        let _ = sigterm.recv().await;
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal(_include_interrupt: bool) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
