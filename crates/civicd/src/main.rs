//! civicd - 311 assistant daemon.

use civic_common::config::Config;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("[BOOT] civicd v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env();
    for line in config.summary_lines() {
        info!("[BOOT] {line}");
    }

    if let Err(err) = civicd::server::run(config).await {
        error!("[FATAL] {err:#}");
        std::process::exit(1);
    }
}
