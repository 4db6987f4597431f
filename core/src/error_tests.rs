//! Tests for core error types

use crate::error::{CoreError, LifecycleError, ProcessError};
use std::path::PathBuf;

#[test]
fn test_lifecycle_error_codes() {
    assert_eq!(
        LifecycleError::SetupFailed("boom".to_string()).code(),
        "LIFE001"
    );
    assert_eq!(
        LifecycleError::CleanupFailed {
            hook: "async_cleanup",
            message: "boom".to_string()
        }
        .code(),
        "LIFE002"
    );
    assert_eq!(
        LifecycleError::UnknownState("paused".to_string()).code(),
        "LIFE003"
    );
}

#[test]
fn test_process_error_codes() {
    assert_eq!(ProcessError::Spawn("x".to_string()).code(), "PROC001");
    assert_eq!(ProcessError::UnknownChild(7).code(), "PROC004");
    assert_eq!(
        ProcessError::PidFileMissing {
            name: "worker".to_string(),
            path: PathBuf::from("/tmp/worker.pid"),
        }
        .code(),
        "PROC005"
    );
}

#[test]
fn test_error_display_names_component_and_path() {
    let e = ProcessError::PidFileMissing {
        name: "collector".to_string(),
        path: PathBuf::from("/run/collector.pid"),
    };
    let text = e.to_string();
    assert!(text.contains("collector"));
    assert!(text.contains("/run/collector.pid"));

    let e = ProcessError::AlreadyOn {
        name: "collector".to_string(),
        path: PathBuf::from("/run/collector.pid"),
    };
    assert!(e.to_string().contains("already on"));
}

#[test]
fn test_core_error_wraps_codes_transparently() {
    let e: CoreError = LifecycleError::SetupFailed("bad".to_string()).into();
    assert_eq!(e.code(), "LIFE001");
    assert_eq!(e.to_string(), "Setup hook failed: bad");

    let e: CoreError = ProcessError::UnknownChild(3).into();
    assert_eq!(e.code(), "PROC004");

    assert_eq!(
        CoreError::Configuration("bad toml".to_string()).code(),
        "CORE001"
    );
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let e: CoreError = io.into();
    assert_eq!(e.code(), "PROC008");
}
