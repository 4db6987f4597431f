//! Procyon daemon binary
//!
//! The main daemon process: registers its pidfile, installs exit signal
//! handling, and drives the lifecycle state machine to completion.

use daemon::bootstrap;
use procyon_core::{load_config_from_toml_path, CoreConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> daemon::Result<()> {
    procyon_core::utils::init_tracing("info")?;

    let config = match std::env::var("PROCYON_CONFIG") {
        Ok(path) => load_config_from_toml_path(path)?,
        Err(_) => CoreConfig::default(),
    };
    let pid_path = std::env::var("PROCYON_PID_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("procyond.pid"));

    info!("Starting Procyon Daemon");
    bootstrap::run(config, pid_path).await
}
