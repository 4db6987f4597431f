//! Integration tests for Unix child supervision
//!
//! These spawn real processes and verify that:
//! - graceful children live in their own process groups
//! - a stop request terminates the whole group cooperatively
//! - the registry drain leaves no child running

#![cfg(unix)]

use procyon_core::process::{ChildRegistry, GracefulChild, Terminable};
use std::sync::Arc;
use std::time::Duration;

fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[tokio::test]
async fn test_request_stop_terminates_sleep() {
    let child = GracefulChild::spawn("sleeper", "sleep", &["30"]).expect("spawn sleep");
    let pid = child.pid();
    assert!(pid_alive(pid));

    child.request_stop().await.expect("stop request");
    tokio::time::timeout(Duration::from_secs(5), child.await_stopped())
        .await
        .expect("sleep should die on SIGTERM")
        .unwrap();

    // Give the kernel a beat to reap.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pid_alive(pid));
}

#[tokio::test]
async fn test_process_group_isolation() {
    let child = GracefulChild::spawn("sleeper", "sleep", &["5"]).expect("spawn sleep");

    // The child is its own group leader, distinct from ours.
    let our_group = unsafe { libc::getpgrp() };
    assert_ne!(child.pid() as i32, our_group);

    child.kill_group().expect("kill group");
    child.await_stopped().await.unwrap();
}

#[tokio::test]
async fn test_registry_drain_stops_real_children() {
    let registry = ChildRegistry::new();
    let mut pids = Vec::new();

    for i in 0..3 {
        let child = Arc::new(
            GracefulChild::spawn(&format!("sleeper-{i}"), "sleep", &["30"]).expect("spawn sleep"),
        );
        pids.push(child.pid());
        registry.register(child);
    }
    assert_eq!(registry.len(), 3);

    tokio::time::timeout(Duration::from_secs(10), registry.drain_all())
        .await
        .expect("drain should finish");
    assert!(registry.is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    for pid in pids {
        assert!(!pid_alive(pid), "child {pid} survived the drain");
    }
}

#[tokio::test]
async fn test_natural_exit_then_drain_is_harmless() {
    let registry = ChildRegistry::new();
    let child = Arc::new(GracefulChild::spawn("true", "true", &[]).expect("spawn true"));
    registry.register(Arc::clone(&child) as Arc<dyn Terminable>);

    child.await_stopped().await.unwrap();

    // Stopping an already-exited child during drain is swallowed.
    registry.drain_all().await;
    assert!(registry.is_empty());
}
