//! Core error types and utilities

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the lifecycle state machine
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Setup hook failed: {0}")]
    SetupFailed(String),

    #[error("Cleanup hook '{hook}' failed: {message}")]
    CleanupFailed { hook: &'static str, message: String },

    #[error("Unknown lifecycle state: '{0}'")]
    UnknownState(String),
}

impl LifecycleError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            LifecycleError::SetupFailed(_) => "LIFE001",
            LifecycleError::CleanupFailed { .. } => "LIFE002",
            LifecycleError::UnknownState(_) => "LIFE003",
        }
    }
}

/// Errors raised by child-process supervision and pidfile tracking
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Failed to signal process: {0}")]
    Signal(String),

    #[error("Failed to wait for process: {0}")]
    Wait(String),

    #[error("No child with id {0} is registered")]
    UnknownChild(u64),

    #[error("Component '{name}' is off. Turn it on before stopping it.\n\t-> No pid file exists at: '{path}'")]
    PidFileMissing { name: String, path: PathBuf },

    #[error("Component '{name}' already on. Turn it off before starting it.\n\t-> Pid file exists at: '{path}'")]
    AlreadyOn { name: String, path: PathBuf },

    #[error("Pid file of component '{name}' does not hold a decimal pid ({path}): {message}")]
    PidFileInvalid {
        name: String,
        path: PathBuf,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::Spawn(_) => "PROC001",
            ProcessError::Signal(_) => "PROC002",
            ProcessError::Wait(_) => "PROC003",
            ProcessError::UnknownChild(_) => "PROC004",
            ProcessError::PidFileMissing { .. } => "PROC005",
            ProcessError::AlreadyOn { .. } => "PROC006",
            ProcessError::PidFileInvalid { .. } => "PROC007",
            ProcessError::Io(_) => "PROC008",
        }
    }
}

/// Top-level error type for the core crate
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Lifecycle(e) => e.code(),
            CoreError::Process(e) => e.code(),
            CoreError::Configuration(_) => "CORE001",
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Process(ProcessError::Io(e))
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
