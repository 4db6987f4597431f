#![allow(unused_crate_dependencies)]
//! Helper binary for signal end-to-end tests
//!
//! Runs one scenario per invocation, selected by the first argument:
//!
//! - `backstop`: installs the exit handler with a registered child,
//!   prints "ready <child pid>" and parks; the caller sends SIGTERM and
//!   expects exit status 0 with the child gone.
//! - `late-signal`: a terminate signal raised after a failed run must
//!   not shut down a later start on the same machine; exits 0 when the
//!   second lifecycle stays on.

#[cfg(unix)]
mod scenarios {
    use async_trait::async_trait;
    use procyon_core::process::{GracefulChild, ProcessContext};
    use procyon_core::signals::{self, ProcessRole};
    use procyon_core::{CoreConfig, CoreError, LifecycleHooks, Result, StateMachine};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    pub async fn backstop() {
        let ctx = ProcessContext::new(CoreConfig::default());
        let child =
            Arc::new(GracefulChild::spawn("sleeper", "sleep", &["300"]).expect("spawn sleep"));
        ctx.registry().register(child.clone());
        signals::install(ProcessRole::Main, ctx.registry());

        println!("ready {}", child.pid());
        std::io::stdout().flush().expect("flush stdout");

        // Parked; the exit handler owns termination from here.
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }

    /// Setup that rejects the first start and accepts the second
    struct FlakySetup {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl LifecycleHooks for FlakySetup {
        type StartArgs = ();
        type ShutdownArgs = ();

        async fn setup(&self, _args: &()) -> Result<()> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(CoreError::Configuration("first start rejected".to_string()));
            }
            Ok(())
        }
    }

    pub async fn late_signal() {
        use tokio::signal::unix::{signal, SignalKind};

        // Pin the terminate handler for the whole scenario so raising
        // SIGTERM never falls through to the default disposition.
        let _sigterm_pin = signal(SignalKind::terminate()).expect("install SIGTERM stream");

        let config = CoreConfig {
            shutdown_timeout_ms: 200,
            beat_interval_ms: 10,
        };
        let machine = StateMachine::new(
            FlakySetup {
                attempts: AtomicUsize::new(0),
            },
            config,
        );

        if machine.run((), true, || async {}).await.is_ok() {
            eprintln!("first start unexpectedly succeeded");
            std::process::exit(1);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        nix::sys::signal::raise(nix::sys::signal::Signal::SIGTERM).expect("raise SIGTERM");
        tokio::time::sleep(Duration::from_millis(50)).await;

        let driver = {
            let m = machine.clone();
            tokio::spawn(async move { m.start(()).await })
        };
        machine.wait_for_on().await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        if !machine.is_on() {
            eprintln!("terminate signal from the failed run shut the machine down");
            std::process::exit(1);
        }

        machine.shut_down(());
        machine.wait_for_off().await;
        driver.await.expect("start task").expect("second start");
    }
}

#[cfg(unix)]
#[tokio::main]
async fn main() {
    match std::env::args().nth(1).as_deref() {
        Some("backstop") => scenarios::backstop().await,
        Some("late-signal") => scenarios::late_signal().await,
        other => {
            eprintln!("unknown scenario: {other:?}");
            std::process::exit(2);
        }
    }
}

#[cfg(not(unix))]
fn main() {}
