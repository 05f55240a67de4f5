//! Process-wide connection health record.
//!
//! One owned instance behind a shared lock; every write is a last-writer-wins
//! assignment, acceptable because the record is advisory and display-only.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

/// The tri-state health summary shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSummary {
    SinkUnavailable,
    WaitingForPeer,
    PeerError,
    Connected,
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusSummary::SinkUnavailable => "presence sink unavailable",
            StatusSummary::WaitingForPeer => "waiting for peer",
            StatusSummary::PeerError => "peer error",
            StatusSummary::Connected => "connected",
        };
        f.write_str(text)
    }
}

/// Mutable health state. Initialized to "waiting for peer"; never persisted.
#[derive(Debug)]
pub struct ConnectionStatus {
    sink_available: bool,
    peer_connected: bool,
    last_error: Option<String>,
}

pub type SharedStatus = Arc<RwLock<ConnectionStatus>>;

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStatus {
    pub fn new() -> Self {
        Self {
            sink_available: true,
            peer_connected: false,
            last_error: None,
        }
    }

    pub fn shared() -> SharedStatus {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn set_sink_available(&mut self, available: bool) {
        self.sink_available = available;
    }

    /// A peer completed the upgrade. Clears any prior error.
    pub fn peer_connected(&mut self) {
        self.peer_connected = true;
        self.last_error = None;
    }

    pub fn peer_disconnected(&mut self) {
        self.peer_connected = false;
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Summary precedence: sink availability, then peer presence, then the
    /// most recent error.
    pub fn summary(&self) -> StatusSummary {
        if !self.sink_available {
            StatusSummary::SinkUnavailable
        } else if !self.peer_connected {
            StatusSummary::WaitingForPeer
        } else if self.last_error.is_some() {
            StatusSummary::PeerError
        } else {
            StatusSummary::Connected
        }
    }
}
