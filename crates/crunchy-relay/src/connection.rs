//! Per-connection handler: receive text frames, parse defensively, drive the
//! presence sink.
//!
//! Handlers run independently so a stalled peer cannot block a new
//! connection attempt; only the most recent message from whichever peer is
//! connected matters, so no coordination between handlers is needed.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crunchy_common::presence::map_presence;
use crunchy_common::wire::parse_state_message;

use crate::sink::{presence_update, SharedSink};
use crate::status::SharedStatus;

/// Handle a single WebSocket connection until it closes.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    status: SharedStatus,
    sink: SharedSink,
) {
    let (mut ws_sink, mut ws_stream) = ws.split();

    status.write().await.peer_connected();
    info!(peer = %addr, "peer connected");

    loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => {
                handle_frame(text.as_str(), &status, &sink).await;
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = ws_sink.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                info!(peer = %addr, "peer disconnected");
                break;
            }
            Some(Err(e)) => {
                warn!(peer = %addr, error = %e, "transport fault");
                status.write().await.record_error(format!("transport fault: {e}"));
                break;
            }
            _ => {}
        }
    }

    status.write().await.peer_disconnected();
}

/// Parse one whole frame and deliver the mapped presence.
///
/// Protocol faults never close the connection: a malformed frame records an
/// error and leaves the current presence unchanged. Sink faults likewise
/// record an error; the next message is attempted normally.
async fn handle_frame(text: &str, status: &SharedStatus, sink: &SharedSink) {
    match parse_state_message(text) {
        Ok(msg) => {
            debug!(state = ?msg.display_state, reason = %msg.debug.reason, "state message");
            let update = presence_update(&map_presence(&msg));
            let result = sink.lock().await.set_presence(&update);

            let mut status = status.write().await;
            match result {
                Ok(()) => status.clear_error(),
                Err(e) => {
                    warn!(error = %e, "presence delivery failed");
                    status.record_error(e.to_string());
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "bad state message");
            status.write().await.record_error(format!("bad message: {e}"));
        }
    }
}
