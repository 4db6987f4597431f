//! Integration tests for the daemon bootstrap wiring

use daemon::build_machine;
use daemon::ShutdownReason;
use procyon_core::CoreConfig;
use std::time::Duration;

fn fast_config() -> CoreConfig {
    CoreConfig {
        shutdown_timeout_ms: 300,
        beat_interval_ms: 10,
    }
}

#[tokio::test]
async fn test_daemon_lifecycle_registers_and_removes_pidfile() {
    let dir = tempfile::tempdir().unwrap();
    let pid_path = dir.path().join("procyond.pid");

    let (machine, _ctx) = build_machine(fast_config(), pid_path.clone());

    let driver = {
        let m = machine.clone();
        tokio::spawn(async move { m.start(()).await })
    };

    machine.wait_for_on().await;
    assert!(pid_path.exists());

    machine.shut_down(ShutdownReason("test".to_string()));
    tokio::time::timeout(Duration::from_secs(2), machine.wait_for_off())
        .await
        .expect("daemon shutdown should be bounded");
    driver.await.unwrap().unwrap();

    assert!(!pid_path.exists());
}

#[tokio::test]
async fn test_second_daemon_refuses_existing_pidfile() {
    let dir = tempfile::tempdir().unwrap();
    let pid_path = dir.path().join("procyond.pid");
    std::fs::write(&pid_path, std::process::id().to_string()).unwrap();

    let (machine, _ctx) = build_machine(fast_config(), pid_path);
    let err = machine.start(()).await.unwrap_err();
    // The already-on guard surfaces as a setup failure.
    assert_eq!(err.code(), "LIFE001");
    assert!(err.to_string().contains("already on"));
    assert!(machine.is_off());
}

#[tokio::test]
async fn test_worker_pool_drained_by_daemon_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let (machine, ctx) = build_machine(fast_config(), dir.path().join("pool.pid"));

    let pool = ctx.worker_pool();
    pool.spawn("ticker", |flag| {
        while !flag.is_set() {
            std::thread::sleep(Duration::from_millis(2));
        }
    })
    .unwrap();

    let driver = {
        let m = machine.clone();
        tokio::spawn(async move { m.start(()).await })
    };
    machine.wait_for_on().await;

    machine.shut_down(ShutdownReason::default());
    tokio::time::timeout(Duration::from_secs(2), machine.wait_for_off())
        .await
        .expect("pool drain must not block shutdown");
    driver.await.unwrap().unwrap();

    assert!(ctx.registry().is_empty());
    assert!(pool.is_empty());
}
