//! Transport bridge: owns the outbound connection to the local relay.
//!
//! Latest wins, no queue: state is re-evaluated on a fixed cadence and a
//! frame only goes out when its serialized form differs from the last one
//! transmitted. Evaluation never pauses — the tick loop runs whether or not
//! the channel is open, so a transition that happens during an outage is
//! stamped when it happened, not at reconnect time. While disconnected the
//! frame is simply dropped; the next tick after a reconnect re-supplies
//! current state.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crunchy_common::classify::{build_message, PageSnapshot, TransitionTracker};
use crunchy_common::config::ObserverConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Duplicate suppression on the canonical serialized frame.
///
/// The comparison is byte-for-byte, not semantic: any field change —
/// including a refreshed timestamp — forces a re-send, and a true no-op
/// re-send is blocked.
#[derive(Debug, Default)]
pub struct Deduper {
    last_sent: Option<String>,
}

impl Deduper {
    /// Record the payload and report whether it should be transmitted.
    pub fn should_send(&mut self, payload: &str) -> bool {
        if self.last_sent.as_deref() == Some(payload) {
            return false;
        }
        self.last_sent = Some(payload.to_string());
        true
    }

    /// Forget the last frame. Called on connection loss so the first push
    /// after a reconnect always goes out — the new peer may have seen
    /// nothing.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

/// Single-shot reconnect scheduling: a close while a reconnect is already
/// pending never schedules a second one.
#[derive(Debug, Default)]
pub struct ReconnectGate {
    pending: bool,
}

impl ReconnectGate {
    /// Returns true iff this call newly scheduled the reconnect.
    pub fn schedule(&mut self) -> bool {
        !std::mem::replace(&mut self.pending, true)
    }

    /// The delay elapsed; the next close may schedule again.
    pub fn fired(&mut self) {
        self.pending = false;
    }
}

/// Channel-side state: the split halves plus the dedup and reconnect
/// bookkeeping tied to their lifecycle.
struct Link {
    tx: Option<WsSink>,
    rx: Option<WsSource>,
    dedup: Deduper,
    gate: ReconnectGate,
    reconnect_at: Option<Instant>,
    reconnect_delay: Duration,
}

impl Link {
    /// Starts closed, with the first connect attempt already due.
    fn new(reconnect_delay: Duration) -> Self {
        let mut gate = ReconnectGate::default();
        let reconnect_at = gate.schedule().then(Instant::now);
        Self {
            tx: None,
            rx: None,
            dedup: Deduper::default(),
            gate,
            reconnect_at,
            reconnect_delay,
        }
    }

    fn open(&mut self, ws: WsStream) {
        let (sink, stream) = ws.split();
        self.tx = Some(sink);
        self.rx = Some(stream);
    }

    /// Drop the channel, if any, and schedule exactly one reconnect.
    fn close(&mut self) {
        self.tx = None;
        self.rx = None;
        self.dedup.reset();
        if self.gate.schedule() {
            self.reconnect_at = Some(Instant::now() + self.reconnect_delay);
        }
    }

    /// Send through dedup if the channel is open. A closed channel drops
    /// the frame: nothing is queued, and a reconnect is already pending.
    async fn send(&mut self, payload: String) {
        let Some(sink) = self.tx.as_mut() else { return };
        if !self.dedup.should_send(&payload) {
            return;
        }
        debug!(bytes = payload.len(), "sending state");
        if sink.send(Message::Text(payload.into())).await.is_err() {
            warn!("send failed, channel closed");
            self.close();
        }
    }
}

/// Run the bridge with auto-reconnect. Never returns.
pub async fn run_bridge(config: ObserverConfig, snapshots: watch::Receiver<PageSnapshot>) {
    let mut tracker = TransitionTracker::new();
    let mut link = Link::new(Duration::from_millis(config.reconnect_delay_ms));

    // First tick after the settle delay, then the fixed period — independent
    // of the channel lifecycle.
    let mut ticks = tokio::time::interval_at(
        Instant::now() + Duration::from_millis(config.settle_delay_ms),
        Duration::from_millis(config.poll_interval_ms),
    );

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                // Evaluate unconditionally: the tracker must keep observing
                // transitions even while the channel is down.
                if let Some(payload) = evaluate(&snapshots, &mut tracker) {
                    link.send(payload).await;
                }
            }

            _ = reconnect_due(link.reconnect_at) => {
                link.gate.fired();
                link.reconnect_at = None;
                info!(url = %config.url, "connecting to relay...");
                match connect_async(&config.url).await {
                    Ok((ws, _)) => {
                        info!("channel open");
                        link.open(ws);
                        // Self-healing push: the peer is never stale after a
                        // (re)connect. Dedup was cleared on close, so the
                        // current state always goes out.
                        if let Some(payload) = evaluate(&snapshots, &mut tracker) {
                            link.send(payload).await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to connect to relay");
                        link.close();
                    }
                }
            }

            frame = next_frame(&mut link.rx) => {
                match frame {
                    Some(Ok(Message::Ping(data))) => {
                        if let Some(sink) = link.tx.as_mut() {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        warn!("relay closed connection");
                        link.close();
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "channel error");
                        link.close();
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Resolves when the pending reconnect is due; pends forever otherwise.
async fn reconnect_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Next inbound frame while the channel is open; pends forever otherwise.
async fn next_frame(
    rx: &mut Option<WsSource>,
) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match rx.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Evaluate the current snapshot into a serialized frame, if any.
fn evaluate(
    snapshots: &watch::Receiver<PageSnapshot>,
    tracker: &mut TransitionTracker,
) -> Option<String> {
    let snapshot = snapshots.borrow().clone();
    build_message(&snapshot, tracker, epoch_millis()).map(|msg| msg.to_wire())
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
