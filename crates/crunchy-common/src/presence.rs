//! Pure mapping from a parsed state message to a presence record.

use std::sync::LazyLock;

use regex::Regex;

use crate::wire::{DisplayState, StateMessage};

static WATCH_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^Watch\s+").unwrap());
static SITE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*-\s*Crunchyroll\s*$").unwrap());

/// Consumer-side title cleanup. Deliberately more lenient than the
/// observer's (no whitespace required around the dash): the frame may come
/// from a peer that did not clean the title itself.
fn clean_display_title(title: &str) -> String {
    let stripped = WATCH_PREFIX_RE.replace(title.trim(), "");
    SITE_SUFFIX_RE.replace(&stripped, "").trim().to_string()
}

/// What gets handed to the presence sink. Not retained; each message fully
/// determines the next record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub details_text: String,
    pub state_text: String,
    /// Controls the elapsed-time indicator and activity badge.
    pub is_active: bool,
    /// Millis since epoch; only ever attached when active.
    pub start_time: Option<i64>,
}

/// Map a state message to a presence record. Stateless.
pub fn map_presence(msg: &StateMessage) -> PresenceRecord {
    match msg.display_state {
        DisplayState::Watching => {
            let details_text = match msg.metadata.title.as_deref().filter(|t| !t.is_empty()) {
                Some(title) => format!("Watching {title}"),
                None => "Watching Anime".into(),
            };
            PresenceRecord {
                details_text,
                state_text: msg.metadata.episode.clone().unwrap_or_default(),
                is_active: true,
                start_time: msg.timestamp,
            }
        }
        DisplayState::Looking => PresenceRecord {
            details_text: "Looking at".into(),
            state_text: clean_display_title(&msg.display_title),
            is_active: false,
            start_time: None,
        },
        DisplayState::Browsing => PresenceRecord {
            details_text: "Browsing Crunchyroll".into(),
            state_text: String::new(),
            is_active: false,
            start_time: None,
        },
    }
}
