//! PID-file based liveness tracking
//!
//! Maps a logical component name to a file holding the pid of its
//! running instance, so an external vantage point (another process, an
//! admin tool) can answer "is this component on". File existence is the
//! authoritative liveness signal; the pid inside is resolved lazily and
//! a stale file left behind by an ungraceful crash is removed on the
//! next resolution.

use crate::config::CoreConfig;
use crate::error::ProcessError;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Tracks one component instance through its pid file
#[derive(Debug, Clone)]
pub struct PidManager {
    name: String,
    path: PathBuf,
    beat: Duration,
}

impl PidManager {
    /// Create a manager for `name` backed by the file at `path`
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
            beat: CoreConfig::default().beat_interval(),
        }
    }

    /// Override the polling beat used by the waiters
    pub fn with_beat(mut self, beat: Duration) -> Self {
        self.beat = beat;
        self
    }

    /// Path of the pid file
    pub fn pid_path(&self) -> &Path {
        &self.path
    }

    /// Component name used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overwrite the pid file with the current process id
    pub fn register(&self) -> Result<()> {
        fs::write(&self.path, std::process::id().to_string())?;
        Ok(())
    }

    /// Parse and return the stored pid
    pub fn get(&self) -> Result<i32> {
        if !self.exists() {
            return Err(ProcessError::PidFileMissing {
                name: self.name.clone(),
                path: self.path.clone(),
            }
            .into());
        }
        let raw = fs::read_to_string(&self.path)?;
        raw.trim().parse::<i32>().map_err(|e| {
            ProcessError::PidFileInvalid {
                name: self.name.clone(),
                path: self.path.clone(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Delete the pid file if present
    pub fn remove(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Whether the pid file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// File-existence liveness signal; not cross-checked against the OS
    /// process table
    pub fn is_on(&self) -> bool {
        self.exists()
    }

    /// Guard: fail unless the component is on
    pub fn check_is_on(&self) -> Result<()> {
        if !self.is_on() {
            return Err(ProcessError::PidFileMissing {
                name: self.name.clone(),
                path: self.path.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Guard: fail unless the component is off
    pub fn check_is_off(&self) -> Result<()> {
        if self.is_on() {
            return Err(ProcessError::AlreadyOn {
                name: self.name.clone(),
                path: self.path.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Lazily resolve the stored pid to a live process
    ///
    /// A pid that no longer matches a running process means the
    /// component crashed without `remove()`: the stale file is deleted
    /// and the component treated as off.
    fn resolve(&self) -> Option<i32> {
        let pid = self.get().ok()?;
        if process_alive(pid) {
            return Some(pid);
        }
        if self.exists() {
            let _ = self.remove();
            warn!(
                component = %self.name,
                path = %self.path.display(),
                "pid file of component does not match a running process pid, file was removed"
            );
        }
        None
    }

    /// Request OS termination of the resolved process
    ///
    /// Silent success when the process is already gone.
    pub fn terminate_process(&self) -> Result<()> {
        let Some(pid) = self.resolve() else {
            return Ok(());
        };
        terminate(pid)
    }

    /// Block until the resolved process exits; returns immediately when
    /// it is already gone
    pub async fn wait_for_process(&self) {
        let Some(pid) = self.resolve() else { return };
        while process_alive(pid) {
            tokio::time::sleep(self.beat).await;
        }
    }

    /// Poll at the beat until the component is on
    pub async fn wait_for_on(&self) {
        while !self.is_on() {
            tokio::time::sleep(self.beat).await;
        }
    }

    /// Poll at the beat until the component is off
    pub async fn wait_for_off(&self) {
        while self.is_on() {
            tokio::time::sleep(self.beat).await;
        }
    }
}

/// Probe process existence with a null signal
#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        // The process exists but belongs to another user.
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    // No portable probe; the pid file itself stays authoritative.
    true
}

#[cfg(unix)]
fn terminate(pid: i32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => {
            warn!(pid, "tried to terminate a process that no longer exists");
            Ok(())
        }
        Err(e) => Err(ProcessError::Signal(format!(
            "Failed to send SIGTERM to process {}: {}",
            pid, e
        ))
        .into()),
    }
}

#[cfg(not(unix))]
fn terminate(pid: i32) -> Result<()> {
    Err(ProcessError::Signal(format!(
        "Process termination by pid ({}) is not supported on this platform",
        pid
    ))
    .into())
}
