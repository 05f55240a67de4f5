//! crunchy-observer: page-side half of the bridge.
//!
//! Consumes page snapshots as JSON lines on stdin (the in-page probe is an
//! external collaborator), classifies them into a display state on a fixed
//! cadence, and pushes state messages to the local relay over a
//! self-reconnecting WebSocket. Delivery is at-most-latest: nothing is
//! queued, and a byte-identical payload is never re-sent.

mod bridge;
mod signals;

use std::path::PathBuf;

use clap::Parser;
use crunchy_common::config::{self, BridgeConfig};

#[derive(Parser)]
#[command(name = "crunchy-observer", about = "Page activity observer for the CrunchyBridge relay")]
struct Args {
    /// WebSocket URL of the relay (overrides config).
    #[arg(long)]
    url: Option<String>,

    /// Config file path override.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crunchy_observer=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "config error, falling back to defaults");
            BridgeConfig::default()
        }
    };

    let mut observer = config.observer;
    if let Some(url) = args.url {
        observer.url = url;
    }

    let (snapshot_tx, snapshot_rx) = signals::channel();
    tokio::spawn(signals::read_stdin(snapshot_tx));

    bridge::run_bridge(observer, snapshot_rx).await;
}
