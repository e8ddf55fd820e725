//! Session keep-alive sidecar.
//!
//! Salesforce session tokens lapse when the org sits idle. This binary
//! runs a trivial query once an hour so the token the daemon shares
//! stays warm. Run it alongside civicd; stop it with Ctrl+C when the
//! token is allowed to expire.

use std::time::Duration;

use civicd::salesforce::{CaseDesk, SalesforceDesk};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const PING_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = civic_common::config::Config::from_env();
    let Some(salesforce) = config.salesforce else {
        // A supervisor would restart an exiting process in a tight loop,
        // so park instead and wait for the operator.
        warn!("[BOOT] salesforce credentials not set; nothing to keep alive");
        wait_for_shutdown().await;
        return;
    };

    let desk = match SalesforceDesk::new(&salesforce) {
        Ok(desk) => desk,
        Err(err) => {
            error!("[FATAL] could not build salesforce client: {err:#}");
            std::process::exit(1);
        }
    };

    info!("[BOOT] keep-alive v{} starting", env!("CARGO_PKG_VERSION"));
    info!("[BOOT] instance: {}", salesforce.instance_url);
    info!("[BOOT] pinging every 60 minutes; Ctrl+C to stop");

    // The first tick fires immediately, so the token gets refreshed at
    // startup rather than an hour in.
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    let mut ping_count: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ping_count += 1;
                match desk.ping().await {
                    Ok(total) => {
                        info!("ping #{ping_count}: token still alive ({total} cases visible)");
                    }
                    Err(err) => {
                        warn!("ping #{ping_count} failed, continuing: {err}");
                        warn!("check the access token if this persists");
                    }
                }
            }
            _ = wait_for_shutdown() => {
                info!("keep-alive stopped after {ping_count} pings");
                break;
            }
        }
    }
}

async fn wait_for_shutdown() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}
