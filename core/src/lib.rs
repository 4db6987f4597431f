//! Lifecycle core for the Procyon service-hosting framework
//!
//! This crate contains the two halves of service lifecycle management:
//!
//! - an in-process cooperative task lifecycle (`lifecycle`): a tri-state
//!   machine with bounded-timeout graceful shutdown, and
//! - external OS child supervision (`process`, `signals`, `pidfile`):
//!   cooperative termination of children, a process-wide cleanup
//!   registry, and pidfile-based liveness tracking.
//!
//! Collaborators (admin layers, configuration builders) interact with
//! the core only through the hook set, the shutdown request and the
//! state queries.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pidfile;
pub mod process;
pub mod signals;

#[cfg(test)]
mod error_tests;

pub use config::{load_config_from_toml_path, load_config_from_toml_str, CoreConfig};
pub use error::{CoreError, LifecycleError, ProcessError, Result};
pub use lifecycle::{LifecycleHooks, LifecycleState, StateMachine};
pub use pidfile::PidManager;
pub use process::{ChildRegistry, ProcessContext, Terminable};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::Configuration(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
