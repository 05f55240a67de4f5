//! Presence sink boundary.
//!
//! The actual presence SDK is an external collaborator; everything behind
//! `PresenceSink` is opaque to the relay. The default sink logs the update,
//! which keeps the relay fully functional without a presence host.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crunchy_common::presence::PresenceRecord;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("presence host unavailable: {0}")]
    Unavailable(String),

    #[error("presence delivery failed: {0}")]
    Delivery(String),
}

/// An image asset plus its hover text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBadge {
    pub key: &'static str,
    pub text: &'static str,
}

/// The full update handed to the sink: mapped text plus asset and timing
/// fields derived from the activity flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub details_text: String,
    pub state_text: String,
    pub large_image: ImageBadge,
    /// Activity badge, present only while active.
    pub small_image: Option<ImageBadge>,
    /// Elapsed-time start (millis since epoch), present only while active.
    pub activity_start: Option<i64>,
}

/// Derive the sink update from a mapped record. Start time and badge are
/// attached only when the record is active.
pub fn presence_update(record: &PresenceRecord) -> PresenceUpdate {
    PresenceUpdate {
        details_text: record.details_text.clone(),
        state_text: record.state_text.clone(),
        large_image: ImageBadge {
            key: "icon_app",
            text: "Crunchyroll",
        },
        small_image: record.is_active.then_some(ImageBadge {
            key: "icon_play",
            text: "Watching",
        }),
        activity_start: if record.is_active {
            record.start_time
        } else {
            None
        },
    }
}

pub trait PresenceSink: Send + Sync {
    /// Name of this sink, for logging.
    fn name(&self) -> &'static str;

    /// Deliver one update, superseding the previous one.
    fn set_presence(&mut self, update: &PresenceUpdate) -> Result<(), SinkError>;
}

pub type SharedSink = Arc<Mutex<Box<dyn PresenceSink>>>;

/// Default sink: logs each update via `tracing`.
pub struct LogSink;

impl LogSink {
    pub fn init() -> Result<Box<dyn PresenceSink>, SinkError> {
        Ok(Box::new(LogSink))
    }
}

impl PresenceSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn set_presence(&mut self, update: &PresenceUpdate) -> Result<(), SinkError> {
        info!(
            details = %update.details_text,
            state = %update.state_text,
            active = update.small_image.is_some(),
            start = ?update.activity_start,
            "presence update"
        );
        Ok(())
    }
}
