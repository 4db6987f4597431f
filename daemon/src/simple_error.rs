//! Daemon error types

use procyon_core::CoreError;
use thiserror::Error;

/// Daemon-specific error types
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Startup error: {0}")]
    Startup(String),
}

/// Daemon-specific result type
pub type Result<T> = std::result::Result<T, DaemonError>;
