//! Daemon library for the Procyon project

pub mod bootstrap;
pub mod simple_error;

#[cfg(test)]
mod simple_error_tests;

pub use bootstrap::{build_machine, DaemonComponent, ShutdownReason};
pub use simple_error::{DaemonError, Result};
