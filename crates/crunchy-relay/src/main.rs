//! crunchy-relay: desktop-side half of the bridge.
//!
//! Listens on a fixed loopback address for the page observer, parses state
//! messages defensively, and maps each one to a presence update. One peer is
//! meaningful at a time; handlers run per connection so a stalled peer never
//! blocks a fresh one. Health is advisory only, exposed as a tri-state
//! summary and logged on change.

mod connection;
mod sink;
mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_async;

use crunchy_common::config::{self, BridgeConfig};

use crate::connection::handle_connection;
use crate::sink::{LogSink, SharedSink};
use crate::status::{ConnectionStatus, SharedStatus, StatusSummary};

#[derive(Parser)]
#[command(name = "crunchy-relay", about = "Loopback relay mapping page state to presence")]
struct Args {
    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path override.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crunchy_relay=info".into()),
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

    let mut relay = config.relay;
    if let Some(host) = args.host {
        relay.host = host;
    }
    if let Some(port) = args.port {
        relay.port = port;
    }

    let status = ConnectionStatus::shared();

    let sink: SharedSink = match LogSink::init() {
        Ok(sink) => {
            tracing::info!(sink = sink.name(), "presence sink ready");
            Arc::new(Mutex::new(sink))
        }
        Err(e) => {
            tracing::error!(error = %e, "presence sink init failed");
            status.write().await.set_sink_available(false);
            // Keep a sink in place so delivery failures stay visible per
            // message rather than tearing anything down.
            Arc::new(Mutex::new(Box::new(LogSink)))
        }
    };

    // Log the health summary whenever it changes.
    tokio::spawn(report_status(status.clone()));

    let addr = relay.bind_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            // Fatal to the relay role only. The process stays up so the
            // status surface remains readable.
            tracing::error!(addr = %addr, error = %e, "failed to bind listener");
            status.write().await.record_error(format!("bind failed: {e}"));
            std::future::pending::<()>().await;
            return;
        }
    };

    tracing::info!("crunchy-relay listening on {}", addr);

    // Accept loop.
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let status = status.clone();
                let sink = sink.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, peer, status, sink).await,
                        Err(e) => {
                            // Non-upgrade requests land here and are closed.
                            tracing::warn!(peer = %peer, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Periodically sample the status record and log summary transitions.
async fn report_status(status: SharedStatus) {
    let mut last: Option<StatusSummary> = None;
    loop {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let summary = status.read().await.summary();
        if last != Some(summary) {
            tracing::info!(status = %summary, "health");
            last = Some(summary);
        }
    }
}
