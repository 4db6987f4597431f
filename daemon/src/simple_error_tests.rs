//! Tests for daemon error types

use crate::simple_error::DaemonError;
use procyon_core::{CoreError, LifecycleError};

#[test]
fn test_core_error_passes_through() {
    let e: DaemonError = CoreError::from(LifecycleError::SetupFailed("boom".to_string())).into();
    assert_eq!(e.to_string(), "Setup hook failed: boom");
}

#[test]
fn test_startup_error_display() {
    let e = DaemonError::Startup("missing pid dir".to_string());
    assert_eq!(e.to_string(), "Startup error: missing pid dir");
}
