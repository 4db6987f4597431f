//! Signal-based cooperative termination for Unix child processes
//!
//! Children are spawned in their own process group via `setsid()`, so a
//! stop request can signal the entire process tree by targeting the
//! group. SIGTERM is the cooperative stop; SIGKILL is available as a
//! last resort but is never used by the registry drain.

// Process management requires a libc::setsid() call in pre_exec.
#![allow(unsafe_code)]

use super::{next_child_id, Terminable};
use crate::error::ProcessError;
use crate::Result;
use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::{Child, Command};
use tracing::{debug, error};

/// A child OS process that can be asked to stop cooperatively
///
/// `request_stop` delivers SIGTERM to the child's process group; the
/// child is expected to install its own worker-role exit handler so the
/// signal triggers orderly cleanup of anything it registered itself.
#[derive(Debug)]
pub struct GracefulChild {
    id: u64,
    name: String,
    pid: Pid,
    child: tokio::sync::Mutex<Child>,
    exit_status: tokio::sync::Mutex<Option<ExitStatus>>,
    stop_requested: AtomicBool,
}

impl GracefulChild {
    /// Spawn `cmd` with `args` in a new session and process group
    pub fn spawn(name: &str, cmd: &str, args: &[&str]) -> Result<Self> {
        debug!(child = name, command = cmd, "spawning graceful child");

        let mut command = Command::new(cmd);
        command.args(args);

        // Safety: setsid() is async-signal-safe and appropriate for use
        // in pre_exec.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn().map_err(|e| {
            error!(child = name, command = cmd, error = %e, "failed to spawn child");
            ProcessError::Spawn(format!("Failed to spawn '{}': {}", cmd, e))
        })?;

        let raw_pid = child
            .id()
            .ok_or_else(|| ProcessError::Spawn("Spawned child did not have a PID".to_string()))?;

        Ok(Self {
            id: next_child_id(),
            name: name.to_string(),
            pid: Pid::from_raw(raw_pid as i32),
            child: tokio::sync::Mutex::new(child),
            exit_status: tokio::sync::Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        })
    }

    /// Process id of the child (also its process group id)
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Forcefully terminate the child's process group with SIGKILL
    pub fn kill_group(&self) -> Result<()> {
        signal_group(self.pid, Signal::SIGKILL)
    }
}

#[async_trait]
impl Terminable for GracefulChild {
    fn child_id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn request_stop(&self) -> Result<()> {
        if self.stop_requested.swap(true, Ordering::SeqCst) {
            debug!(child = %self.name, "stop already requested");
            return Ok(());
        }
        signal_group(self.pid, Signal::SIGTERM)
    }

    async fn await_stopped(&self) -> Result<()> {
        let mut cached = self.exit_status.lock().await;
        if cached.is_some() {
            return Ok(());
        }
        let status = self.child.lock().await.wait().await.map_err(|e| {
            ProcessError::Wait(format!("Failed to wait for process {}: {}", self.pid, e))
        })?;
        debug!(child = %self.name, %status, "child exited");
        *cached = Some(status);
        Ok(())
    }
}

/// Send a signal to an entire process group
///
/// ESRCH means the group already exited and EPERM that it exited and its
/// pid was recycled to another owner; both count as success because the
/// desired end state is reached.
fn signal_group(pid: Pid, sig: Signal) -> Result<()> {
    match killpg(pid, sig) {
        Ok(()) => {
            debug!(%pid, signal = %sig, "signalled process group");
            Ok(())
        }
        Err(nix::errno::Errno::ESRCH) | Err(nix::errno::Errno::EPERM) => {
            debug!(%pid, signal = %sig, "process group already gone");
            Ok(())
        }
        Err(e) => {
            error!(%pid, signal = %sig, error = %e, "failed to signal process group");
            Err(ProcessError::Signal(format!(
                "Failed to send {} to process group {}: {}",
                sig, pid, e
            ))
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_assigns_pid_and_id() {
        let child = GracefulChild::spawn("echo", "echo", &["hello"]).expect("spawn echo");
        assert!(child.pid() > 0);
        assert!(child.child_id() > 0);
        child.await_stopped().await.expect("echo should exit");
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        let err = GracefulChild::spawn("missing", "nonexistent_command_12345", &[]).unwrap_err();
        assert_eq!(err.code(), "PROC001");
    }

    #[tokio::test]
    async fn test_signal_nonexistent_group_is_success() {
        // ESRCH is treated as success: the group is already gone.
        assert!(signal_group(Pid::from_raw(999_999), Signal::SIGTERM).is_ok());
    }

    #[tokio::test]
    async fn test_request_stop_is_idempotent() {
        let child = GracefulChild::spawn("sleeper", "sleep", &["30"]).expect("spawn sleep");
        child.request_stop().await.expect("first stop");
        child.request_stop().await.expect("second stop is a no-op");
        child.await_stopped().await.expect("child should exit");
    }

    #[tokio::test]
    async fn test_await_stopped_twice() {
        let child = GracefulChild::spawn("true", "true", &[]).expect("spawn true");
        child.await_stopped().await.unwrap();
        // Second wait returns the cached exit.
        child.await_stopped().await.unwrap();
    }
}
