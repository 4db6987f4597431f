//! Daemon bootstrap: wire the process context, exit handling and the
//! lifecycle state machine
//!
//! The daemon is the designated main process: it installs the exit
//! signal backstop, registers its pidfile during setup, and hands the
//! exit signals to the state machine for a cooperative shutdown.

use crate::Result;
use async_trait::async_trait;
use procyon_core::process::ProcessContext;
use procyon_core::signals::{self, ProcessRole};
use procyon_core::{CoreConfig, LifecycleHooks, PidManager, StateMachine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Reason attached to a shutdown request, surfaced in cleanup logging
#[derive(Debug, Clone, Default)]
pub struct ShutdownReason(pub String);

/// Hook set binding the daemon's lifecycle to its pidfile and its
/// process-wide resources
pub struct DaemonComponent {
    pid: PidManager,
    ctx: Arc<ProcessContext>,
}

#[async_trait]
impl LifecycleHooks for DaemonComponent {
    type StartArgs = ();
    type ShutdownArgs = ShutdownReason;

    async fn setup(&self, _args: &()) -> procyon_core::Result<()> {
        self.pid.check_is_off()?;
        self.pid.register()?;
        info!(
            component = self.pid.name(),
            pid_file = %self.pid.pid_path().display(),
            "daemon registered"
        );
        Ok(())
    }

    async fn async_cleanup(&self, reason: &ShutdownReason) -> procyon_core::Result<()> {
        if !reason.0.is_empty() {
            info!(reason = %reason.0, "daemon shutting down");
        }
        self.ctx.shutdown().await;
        Ok(())
    }

    fn sync_cleanup(&self, _reason: &ShutdownReason) -> procyon_core::Result<()> {
        self.pid.remove()?;
        Ok(())
    }
}

/// Build the daemon's state machine and its process context
pub fn build_machine(
    config: CoreConfig,
    pid_path: PathBuf,
) -> (StateMachine<DaemonComponent>, Arc<ProcessContext>) {
    let ctx = ProcessContext::new(config.clone());
    let component = DaemonComponent {
        pid: PidManager::new("procyond", pid_path).with_beat(config.beat_interval()),
        ctx: Arc::clone(&ctx),
    };
    (StateMachine::new(component, config), ctx)
}

/// Run the daemon to completion
pub async fn run(config: CoreConfig, pid_path: PathBuf) -> Result<()> {
    let (machine, ctx) = build_machine(config, pid_path);

    signals::install(ProcessRole::Main, ctx.registry());

    // Tracked heartbeat, spawned once the machine is on; it winds down
    // with the shutdown request and is gathered by the drain.
    let starter = machine.clone();
    tokio::spawn(async move {
        starter.wait_for_on().await;
        let beat = starter.clone();
        starter.spawn_tracked_named("heartbeat", async move {
            loop {
                tokio::select! {
                    _ = beat.wait_for_shutting_down() => break,
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {
                        debug!("daemon heartbeat");
                    }
                }
            }
            Ok(())
        });
    });

    machine
        .run((), true, || async {
            info!("daemon exited");
        })
        .await?;
    Ok(())
}
