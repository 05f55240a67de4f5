//! Signal source: page snapshots arrive as JSON lines on stdin.
//!
//! Only the latest snapshot matters; the bridge reads it at its own cadence.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use crunchy_common::classify::PageSnapshot;

/// Channel seeded with an empty snapshot, which classifies to nothing until
/// the probe supplies a real one.
pub fn channel() -> (watch::Sender<PageSnapshot>, watch::Receiver<PageSnapshot>) {
    watch::channel(PageSnapshot::default())
}

/// Read snapshot lines until EOF. Malformed lines are logged and skipped;
/// on EOF the last snapshot stays in effect.
pub async fn read_stdin(tx: watch::Sender<PageSnapshot>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<PageSnapshot>(line) {
                    Ok(snapshot) => {
                        let _ = tx.send(snapshot);
                    }
                    Err(e) => {
                        warn!(error = %e, "bad snapshot line");
                    }
                }
            }
            Ok(None) => {
                info!("snapshot input closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "snapshot read error");
                return;
            }
        }
    }
}
