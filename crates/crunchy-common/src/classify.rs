//! Page-signal classification and state transition tracking.
//!
//! Classification is a pure function of the current snapshot; the tracker is
//! the only stateful piece and exists solely to pin the state-start timestamp
//! across polls.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::wire::{DebugInfo, DisplayState, Metadata, StateMessage};

/// Fragment identifying the embedded video player surface.
const PLAYER_SRC_FRAGMENT: &str = "/vilos-v2/web/vilos/player.html";

/// Hostname of the monitored site.
const MONITORED_HOST: &str = "crunchyroll.com";

static WATCH_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^Watch\s+").unwrap());
static SITE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+-\s+Crunchyroll$").unwrap());

/// A point-in-time capture of the page signals the observer reads.
///
/// Produced outside this crate (the in-page probe is an external
/// collaborator); every field is optional-by-default so a partial capture
/// still classifies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    /// `src` of the embedded player frame, if one is on the page.
    pub player_frame_src: Option<String>,
    /// Whether the embedded frame carries the `video-player` class. Some
    /// player builds load via `blob:` URLs, so the class is an independent
    /// recognition signal.
    pub player_frame_class: bool,
    /// Series heading text, if present.
    pub series_heading: Option<String>,
    /// Episode heading text, if present.
    pub episode_heading: Option<String>,
}

impl PageSnapshot {
    /// Whether a recognized player surface is embedded in the page. Either
    /// signal alone counts: the known src fragment or the player class.
    pub fn has_player_surface(&self) -> bool {
        self.player_frame_src
            .as_deref()
            .is_some_and(|src| src.contains(PLAYER_SRC_FRAGMENT))
            || self.player_frame_class
    }
}

/// Result of classifying one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub state: DisplayState,
    /// Full page title for `Looking`, empty otherwise.
    pub title_hint: String,
    /// Which rule matched, carried on the wire for diagnostics.
    pub reason: &'static str,
}

/// Classify a snapshot into a display state. First match wins; the ordering
/// is the core business rule and must not be reordered.
pub fn classify(snapshot: &PageSnapshot) -> Classification {
    let title = snapshot.title.trim();

    if snapshot.has_player_surface() {
        Classification {
            state: DisplayState::Watching,
            title_hint: title.to_string(),
            reason: "iframe",
        }
    } else if WATCH_PREFIX_RE.is_match(title) {
        Classification {
            state: DisplayState::Looking,
            title_hint: title.to_string(),
            reason: "title-watch",
        }
    } else {
        Classification {
            state: DisplayState::Browsing,
            title_hint: String::new(),
            reason: "default",
        }
    }
}

/// Strip the leading watch prefix and the trailing site suffix from a page
/// title, then trim. The suffix must be whitespace-delimited; a title like
/// "Foo-Crunchyroll" is kept as-is. Idempotent on already-clean titles.
pub fn clean_watch_title(title: &str) -> String {
    let stripped = WATCH_PREFIX_RE.replace(title.trim(), "");
    SITE_SUFFIX_RE.replace(&stripped, "").trim().to_string()
}

/// Whether a URL belongs to the monitored site. Snapshots from anywhere else
/// produce no payload at all.
pub fn is_monitored_url(url: &str) -> bool {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host).to_ascii_lowercase();

    host == MONITORED_HOST || host.ends_with(&format!(".{MONITORED_HOST}"))
}

/// State-start transition rule, isolated from timers and network code.
///
/// Returns `now` iff the state or the URL changed; otherwise the previous
/// start is kept. Content changes alone (metadata, headings) never refresh
/// the start.
pub fn transition_start(
    prev_state: DisplayState,
    prev_url: &str,
    prev_start: i64,
    new_state: DisplayState,
    new_url: &str,
    now: i64,
) -> i64 {
    if new_state != prev_state || new_url != prev_url {
        now
    } else {
        prev_start
    }
}

/// Observer-local tracker for `(last_state, last_url, state_start)`.
///
/// The first observation always counts as a transition.
#[derive(Debug, Default)]
pub struct TransitionTracker {
    last: Option<(DisplayState, String)>,
    state_start: i64,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one evaluation and return the state-start timestamp to report.
    pub fn observe(&mut self, state: DisplayState, url: &str, now: i64) -> i64 {
        self.state_start = match &self.last {
            Some((prev_state, prev_url)) => {
                transition_start(*prev_state, prev_url, self.state_start, state, url, now)
            }
            None => now,
        };
        self.last = Some((state, url.to_string()));
        self.state_start
    }
}

/// Build the outbound state message for one snapshot, or `None` when the
/// snapshot is not from the monitored site.
pub fn build_message(
    snapshot: &PageSnapshot,
    tracker: &mut TransitionTracker,
    now: i64,
) -> Option<StateMessage> {
    if !is_monitored_url(&snapshot.url) {
        return None;
    }

    let classified = classify(snapshot);
    let start = tracker.observe(classified.state, &snapshot.url, now);

    let display_title = if classified.state == DisplayState::Looking {
        clean_watch_title(&classified.title_hint)
    } else {
        String::new()
    };

    let metadata = if classified.state == DisplayState::Watching {
        Metadata {
            source: "dom".into(),
            title: nonempty_trimmed(snapshot.series_heading.as_deref()),
            episode: nonempty_trimmed(snapshot.episode_heading.as_deref()),
        }
    } else {
        Metadata::none()
    };

    Some(StateMessage {
        display_state: classified.state,
        display_title,
        metadata,
        url: snapshot.url.clone(),
        timestamp: Some(start),
        debug: DebugInfo {
            reason: classified.reason.into(),
        },
    })
}

fn nonempty_trimmed(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watching_snapshot() -> PageSnapshot {
        PageSnapshot {
            url: "https://www.crunchyroll.com/watch/ABC123/foo-ep-3".into(),
            title: "Watch Foo Episode 3 - Crunchyroll".into(),
            player_frame_src: Some(
                "https://static.crunchyroll.com/vilos-v2/web/vilos/player.html?...".into(),
            ),
            player_frame_class: false,
            series_heading: Some("Foo".into()),
            episode_heading: Some("Ep 3".into()),
        }
    }

    #[test]
    fn player_surface_wins_over_watch_title() {
        // The title alone would classify as Looking; the player frame must win.
        let snapshot = watching_snapshot();
        let c = classify(&snapshot);
        assert_eq!(c.state, DisplayState::Watching);
        assert_eq!(c.reason, "iframe");
    }

    #[test]
    fn watch_prefix_classifies_as_looking() {
        let snapshot = PageSnapshot {
            url: "https://www.crunchyroll.com/series/foo".into(),
            title: "Watch Foo - Crunchyroll".into(),
            ..Default::default()
        };
        let c = classify(&snapshot);
        assert_eq!(c.state, DisplayState::Looking);
        assert_eq!(c.title_hint, "Watch Foo - Crunchyroll");
        assert_eq!(c.reason, "title-watch");

        // Case-insensitive prefix.
        let snapshot = PageSnapshot {
            title: "watch Foo".into(),
            ..snapshot
        };
        assert_eq!(classify(&snapshot).state, DisplayState::Looking);
    }

    #[test]
    fn everything_else_is_browsing() {
        let snapshot = PageSnapshot {
            url: "https://www.crunchyroll.com/".into(),
            title: "Crunchyroll - Home".into(),
            ..Default::default()
        };
        let c = classify(&snapshot);
        assert_eq!(c.state, DisplayState::Browsing);
        assert_eq!(c.title_hint, "");
        assert_eq!(c.reason, "default");

        // "Watchlist" does not match the prefix (needs trailing whitespace).
        let snapshot = PageSnapshot {
            title: "Watchlist - Crunchyroll".into(),
            ..snapshot
        };
        assert_eq!(classify(&snapshot).state, DisplayState::Browsing);
    }

    #[test]
    fn unrecognized_frame_src_is_not_a_player() {
        let snapshot = PageSnapshot {
            url: "https://www.crunchyroll.com/foo".into(),
            title: "Foo".into(),
            player_frame_src: Some("https://ads.example.com/frame.html".into()),
            ..Default::default()
        };
        assert_eq!(classify(&snapshot).state, DisplayState::Browsing);
    }

    #[test]
    fn player_class_alone_is_a_player_surface() {
        // blob: player loads carry no recognizable src; the class signal
        // must classify as Watching on its own.
        let snapshot = PageSnapshot {
            url: "https://www.crunchyroll.com/watch/ABC123/foo-ep-3".into(),
            title: "Watch Foo Episode 3 - Crunchyroll".into(),
            player_frame_src: Some("blob:https://www.crunchyroll.com/0f3a".into()),
            player_frame_class: true,
            ..Default::default()
        };
        let c = classify(&snapshot);
        assert_eq!(c.state, DisplayState::Watching);
        assert_eq!(c.reason, "iframe");

        // Class with no src at all still counts.
        let snapshot = PageSnapshot {
            player_frame_src: None,
            ..snapshot
        };
        assert_eq!(classify(&snapshot).state, DisplayState::Watching);
    }

    #[test]
    fn clean_title_strips_prefix_and_suffix() {
        assert_eq!(clean_watch_title("Watch Foo - Crunchyroll"), "Foo");
        assert_eq!(clean_watch_title("watch  Foo -  Crunchyroll "), "Foo");
        assert_eq!(clean_watch_title("Foo"), "Foo");
        // Idempotent on already-clean titles.
        assert_eq!(clean_watch_title(&clean_watch_title("Watch Foo")), "Foo");
    }

    #[test]
    fn clean_title_requires_a_delimited_suffix() {
        // An undelimited trailing "Crunchyroll" is part of the title.
        assert_eq!(clean_watch_title("Foo-Crunchyroll"), "Foo-Crunchyroll");
        assert_eq!(clean_watch_title("Foo -Crunchyroll"), "Foo -Crunchyroll");
    }

    #[test]
    fn monitored_url_matches_host_and_subdomains() {
        assert!(is_monitored_url("https://www.crunchyroll.com/watch/x"));
        assert!(is_monitored_url("https://crunchyroll.com/"));
        assert!(is_monitored_url("https://CRUNCHYROLL.COM/home"));
        assert!(!is_monitored_url("https://example.com/crunchyroll.com"));
        assert!(!is_monitored_url("https://notcrunchyroll.com/"));
        assert!(!is_monitored_url(""));
    }

    #[test]
    fn start_is_stable_while_state_and_url_hold() {
        let mut tracker = TransitionTracker::new();
        let start = tracker.observe(DisplayState::Watching, "https://x/1", 1_000);
        assert_eq!(start, 1_000);

        // Repeated evaluations of the same pair keep the start.
        assert_eq!(tracker.observe(DisplayState::Watching, "https://x/1", 2_000), 1_000);
        assert_eq!(tracker.observe(DisplayState::Watching, "https://x/1", 3_000), 1_000);
    }

    #[test]
    fn start_moves_exactly_once_per_transition() {
        let mut tracker = TransitionTracker::new();
        tracker.observe(DisplayState::Browsing, "https://x/1", 1_000);

        // State change.
        assert_eq!(tracker.observe(DisplayState::Watching, "https://x/1", 2_000), 2_000);
        // URL change, same state.
        assert_eq!(tracker.observe(DisplayState::Watching, "https://x/2", 3_000), 3_000);
        // Stable again.
        assert_eq!(tracker.observe(DisplayState::Watching, "https://x/2", 4_000), 3_000);
    }

    #[test]
    fn transition_rule_ignores_content_changes() {
        // Only (state, url) feed the rule; metadata is not an input at all.
        let start = transition_start(
            DisplayState::Watching,
            "https://x/1",
            1_000,
            DisplayState::Watching,
            "https://x/1",
            9_000,
        );
        assert_eq!(start, 1_000);
    }

    #[test]
    fn build_message_for_watching_carries_metadata() {
        let mut tracker = TransitionTracker::new();
        let msg = build_message(&watching_snapshot(), &mut tracker, 5_000).unwrap();

        assert_eq!(msg.display_state, DisplayState::Watching);
        assert_eq!(msg.display_title, "");
        assert_eq!(msg.metadata.source, "dom");
        assert_eq!(msg.metadata.title.as_deref(), Some("Foo"));
        assert_eq!(msg.metadata.episode.as_deref(), Some("Ep 3"));
        assert_eq!(msg.timestamp, Some(5_000));
        assert_eq!(msg.debug.reason, "iframe");
    }

    #[test]
    fn build_message_for_looking_cleans_title() {
        let snapshot = PageSnapshot {
            url: "https://www.crunchyroll.com/series/foo".into(),
            title: "Watch Foo - Crunchyroll".into(),
            ..Default::default()
        };
        let mut tracker = TransitionTracker::new();
        let msg = build_message(&snapshot, &mut tracker, 5_000).unwrap();

        assert_eq!(msg.display_state, DisplayState::Looking);
        assert_eq!(msg.display_title, "Foo");
        assert_eq!(msg.metadata, crate::wire::Metadata::none());
    }

    #[test]
    fn build_message_absent_headings_yield_null_fields() {
        let snapshot = PageSnapshot {
            series_heading: None,
            episode_heading: Some("   ".into()),
            ..watching_snapshot()
        };
        let mut tracker = TransitionTracker::new();
        let msg = build_message(&snapshot, &mut tracker, 5_000).unwrap();
        assert_eq!(msg.metadata.title, None);
        assert_eq!(msg.metadata.episode, None);
    }

    #[test]
    fn build_message_skips_foreign_sites() {
        let snapshot = PageSnapshot {
            url: "https://example.com/".into(),
            title: "Watch Foo".into(),
            ..Default::default()
        };
        let mut tracker = TransitionTracker::new();
        assert!(build_message(&snapshot, &mut tracker, 5_000).is_none());
    }

    #[test]
    fn metadata_change_does_not_refresh_timestamp() {
        let mut tracker = TransitionTracker::new();
        let first = build_message(&watching_snapshot(), &mut tracker, 1_000).unwrap();

        let changed = PageSnapshot {
            episode_heading: Some("Ep 4".into()),
            ..watching_snapshot()
        };
        let second = build_message(&changed, &mut tracker, 9_000).unwrap();

        assert_eq!(first.timestamp, second.timestamp);
        assert_ne!(first.metadata.episode, second.metadata.episode);
    }
}
