//! Tri-state lifecycle state machine
//!
//! This module drives a component through its cooperative lifecycle:
//!
//! ```text
//! Off → On → ShuttingDown → Off
//! ```
//!
//! The state machine runs a setup hook, flips to `On`, suspends until a
//! shutdown request is observed, then executes the shutdown sequence:
//! async cleanup, a bounded drain of tracked tasks, sync cleanup, `Off`.
//!
//! ## Components
//!
//! - [`LifecycleState`]: the tagged state value
//! - [`LifecycleHooks`]: the overridable setup/cleanup hook set
//! - [`StateMachine`]: the driver, cheaply cloneable across tasks
//!
//! State is held in a `tokio::sync::watch` channel, so "wait until state
//! is X" resolves exactly on entering X and is never polled.

use crate::config::CoreConfig;
use crate::error::{LifecycleError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, Notify};
use tokio::time::{timeout, Instant};
use tracing::{error, info, warn};


/// Lifecycle state of a component
///
/// Exactly one state holds at any instant; transitions are
/// `Off → On` (start), `On → ShuttingDown` (shutdown request) and
/// `ShuttingDown → Off` (end of the shutdown sequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Setup has completed; the component is serving
    On,
    /// A shutdown request was observed; cleanup is in progress
    ShuttingDown,
    /// Initial and final state
    Off,
}

impl LifecycleState {
    /// Canonical lowercase name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::On => "on",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Off => "off",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = LifecycleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "on" => Ok(LifecycleState::On),
            "shutting_down" => Ok(LifecycleState::ShuttingDown),
            "off" => Ok(LifecycleState::Off),
            other => Err(LifecycleError::UnknownState(other.to_string())),
        }
    }
}

/// Overridable setup/cleanup hook set
///
/// All hooks default to no-ops. `setup` receives the arguments given to
/// [`StateMachine::start`]; both cleanup hooks receive the arguments given
/// to [`StateMachine::shut_down`] (or `ShutdownArgs::default()` when the
/// shutdown was triggered without arguments, e.g. by a signal).
#[async_trait]
pub trait LifecycleHooks: Send + Sync + 'static {
    /// Arguments accepted by `setup`
    type StartArgs: Send + Sync + 'static;
    /// Arguments captured by `shut_down` and handed to the cleanup hooks
    type ShutdownArgs: Clone + Default + Send + Sync + 'static;

    /// Suspending setup hook, run before the state flips to `On`
    async fn setup(&self, _args: &Self::StartArgs) -> Result<()> {
        Ok(())
    }

    /// Suspending cleanup hook, run first in the shutdown sequence
    async fn async_cleanup(&self, _args: &Self::ShutdownArgs) -> Result<()> {
        Ok(())
    }

    /// Non-suspending cleanup hook, run after the tracked-task drain
    fn sync_cleanup(&self, _args: &Self::ShutdownArgs) -> Result<()> {
        Ok(())
    }
}

/// Shared state behind the cloneable [`StateMachine`] handle
struct Shared<H: LifecycleHooks> {
    config: CoreConfig,
    state_tx: watch::Sender<LifecycleState>,
    state_rx: watch::Receiver<LifecycleState>,
    /// Arguments stored by `shut_down`, consumed by the shutdown sequence
    pending_args: Mutex<Option<H::ShutdownArgs>>,
    /// Names of live tracked tasks, keyed by task id
    tasks: Mutex<HashMap<u64, String>>,
    next_task_id: AtomicU64,
    /// Signalled whenever a tracked task completes
    task_done: Notify,
}

/// The tri-state cooperative lifecycle driver
///
/// Cloning yields another handle to the same machine, so `shut_down` may
/// be invoked from inside a tracked task.
pub struct StateMachine<H: LifecycleHooks> {
    hooks: Arc<H>,
    inner: Arc<Shared<H>>,
}

impl<H: LifecycleHooks> Clone for StateMachine<H> {
    fn clone(&self) -> Self {
        Self {
            hooks: Arc::clone(&self.hooks),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: LifecycleHooks> StateMachine<H> {
    /// Create a new state machine in the `Off` state
    pub fn new(hooks: H, config: CoreConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(LifecycleState::Off);
        Self {
            hooks: Arc::new(hooks),
            inner: Arc::new(Shared {
                config,
                state_tx,
                state_rx,
                pending_args: Mutex::new(None),
                tasks: Mutex::new(HashMap::new()),
                next_task_id: AtomicU64::new(0),
                task_done: Notify::new(),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        *self.inner.state_rx.borrow()
    }

    /// Whether the component is on
    pub fn is_on(&self) -> bool {
        self.state() == LifecycleState::On
    }

    /// Whether the shutdown sequence is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.state() == LifecycleState::ShuttingDown
    }

    /// Whether the component is off
    pub fn is_off(&self) -> bool {
        self.state() == LifecycleState::Off
    }

    /// Suspend until the given state is entered
    pub async fn wait_for(&self, target: LifecycleState) {
        let mut rx = self.inner.state_rx.clone();
        loop {
            if *rx.borrow_and_update() == target {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Suspend until the state is `On`
    pub async fn wait_for_on(&self) {
        self.wait_for(LifecycleState::On).await;
    }

    /// Suspend until the state is `ShuttingDown`
    pub async fn wait_for_shutting_down(&self) {
        self.wait_for(LifecycleState::ShuttingDown).await;
    }

    /// Suspend until the state is `Off`
    pub async fn wait_for_off(&self) {
        self.wait_for(LifecycleState::Off).await;
    }

    fn set_state(&self, state: LifecycleState) {
        self.inner.state_tx.send_replace(state);
        info!(state = %state, "lifecycle state changed");
    }

    /// Run the setup hook, flip to `On`, and block until the shutdown
    /// sequence has completed and the state is `Off`
    ///
    /// Called while not `Off`, this logs a warning and returns without
    /// re-invoking `setup`.
    pub async fn start(&self, args: H::StartArgs) -> Result<()> {
        if !self.is_off() {
            warn!(state = %self.state(), "asked to start although not off");
            return Ok(());
        }

        self.hooks
            .setup(&args)
            .await
            .map_err(|e| LifecycleError::SetupFailed(e.to_string()))?;

        self.set_state(LifecycleState::On);

        self.wait_for_shutting_down().await;
        info!("shutdown state was set, wait finished");

        self.run_shutdown_sequence().await;
        Ok(())
    }

    /// Request shutdown: store the arguments and flip `On → ShuttingDown`
    ///
    /// Non-blocking; the shutdown sequence itself runs on the task that
    /// called [`StateMachine::start`]. Returns whether this call won the
    /// transition; a losing call is a no-op with a warning and its
    /// arguments are discarded.
    pub fn shut_down(&self, args: H::ShutdownArgs) -> bool {
        info!("shut_down was called");

        // The args lock is held across the transition: the winning
        // request's arguments are in place before the shutdown sequence
        // can consume them, and a losing request cannot overwrite them.
        let mut pending = self.lock_pending();
        let transitioned = self.inner.state_tx.send_if_modified(|state| {
            if *state == LifecycleState::On {
                *state = LifecycleState::ShuttingDown;
                true
            } else {
                false
            }
        });
        if !transitioned {
            warn!(state = %self.state(), "asked to shut down although not on");
            return false;
        }

        *pending = Some(args);
        info!(state = %LifecycleState::ShuttingDown, "lifecycle state changed");
        true
    }

    /// Schedule a unit of concurrent work and track it for the shutdown
    /// drain
    ///
    /// Errors and panics inside the task are logged and never propagated.
    /// Prefer [`StateMachine::spawn_tracked_named`] where possible: it
    /// attributes failures and straggler warnings to the given name.
    pub fn spawn_tracked<F>(&self, future: F) -> u64
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.spawn_tracked_named("unnamed-task", future)
    }

    /// [`StateMachine::spawn_tracked`] with a name used in diagnostics
    pub fn spawn_tracked_named<F>(&self, name: &str, future: F) -> u64
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = self.inner.next_task_id.fetch_add(1, Ordering::Relaxed);
        self.lock_tasks().insert(id, name.to_string());

        let handle = tokio::spawn(future);

        // Watcher: log the outcome and clear the table entry on completion.
        let inner = Arc::clone(&self.inner);
        let task_name = name.to_string();
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(task = %task_name, error = %e, "tracked task failed");
                }
                Err(e) => {
                    error!(task = %task_name, error = %e, "tracked task panicked");
                }
            }
            inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            inner.task_done.notify_waiters();
        });

        id
    }

    /// Number of live tracked tasks
    pub fn tracked_count(&self) -> usize {
        self.lock_tasks().len()
    }

    /// Names of live tracked tasks (straggler handles remain here after a
    /// timed-out drain)
    pub fn tracked_task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_tasks().values().cloned().collect();
        names.sort();
        names
    }

    /// Top-level driver: optionally converts the first exit signal into a
    /// shutdown request, drives [`StateMachine::start`] to completion,
    /// then runs `finalizer`
    pub async fn run<F, Fut>(&self, args: H::StartArgs, handle_signals: bool, finalizer: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let signal_task = if handle_signals {
            // The exit-signal backstop defers to us while this is set.
            crate::signals::set_cooperative_shutdown(true);
            let machine = self.clone();
            Some(tokio::spawn(async move {
                if crate::signals::wait_for_exit_signal().await.is_ok() {
                    warn!("SIGINT or SIGTERM received");
                    if !machine.is_on() {
                        machine.wait_for_on().await;
                    }
                    machine.shut_down(H::ShutdownArgs::default());
                }
            }))
        } else {
            None
        };

        let result = self.start(args).await;

        if let Some(task) = signal_task {
            // The wait is bounded to this lifecycle: a signal observed
            // here must not shut down a later start on the same machine.
            task.abort();
            crate::signals::set_cooperative_shutdown(false);
        }

        finalizer().await;
        result
    }

    /// Execute the shutdown sequence; always reaches `Off`
    async fn run_shutdown_sequence(&self) {
        info!("shutting down system");

        let args = self.lock_pending().take().unwrap_or_default();

        if let Err(e) = self.hooks.async_cleanup(&args).await {
            warn!("{}", LifecycleError::CleanupFailed {
                hook: "async_cleanup",
                message: e.to_string(),
            });
        }

        let stragglers = self.drain_tracked().await;
        if !stragglers.is_empty() {
            warn!(
                timeout_ms = self.inner.config.shutdown_timeout_ms,
                pending_tasks = %stragglers.join(", "),
                "some tasks are still pending after timeout although they shouldn't"
            );
        }

        if let Err(e) = self.hooks.sync_cleanup(&args) {
            warn!("{}", LifecycleError::CleanupFailed {
                hook: "sync_cleanup",
                message: e.to_string(),
            });
        }

        // Stored arguments are consumed exactly once.
        *self.lock_pending() = None;

        self.set_state(LifecycleState::Off);
        info!("system is shut down");
    }

    /// Wait for tracked tasks to complete, bounded by the configured
    /// shutdown timeout; returns the names of tasks still pending
    ///
    /// Stragglers are never cancelled: their names are reported and the
    /// handles stay in the table. Process exit is the true reclaimer.
    async fn drain_tracked(&self) -> Vec<String> {
        let deadline = Instant::now() + self.inner.config.shutdown_timeout();
        loop {
            let notified = self.inner.task_done.notified();
            tokio::pin!(notified);
            // Register interest before checking emptiness so a completion
            // between the check and the await cannot be missed.
            notified.as_mut().enable();

            if self.lock_tasks().is_empty() {
                return Vec::new();
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if timeout(deadline - now, notified).await.is_err() {
                break;
            }
        }
        self.tracked_task_names()
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, HashMap<u64, String>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<H::ShutdownArgs>> {
        self.inner
            .pending_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
