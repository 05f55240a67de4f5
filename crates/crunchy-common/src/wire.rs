//! Wire protocol: the JSON state message exchanged between the page observer
//! and the desktop relay.
//!
//! Serialization is exact (the observer's dedup compares serialized text
//! byte-for-byte), but parsing is defensive: the relay accepts frames from an
//! untrusted page context, so every field falls back to a safe default and
//! unknown fields are tolerated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::WireError;

/// Coarse classification of the user's activity on the page.
///
/// Exactly one state is active at any time. Unrecognized wire values fold to
/// `Browsing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayState {
    Watching,
    Looking,
    Browsing,
}

impl DisplayState {
    /// Map a wire string to a state. Anything unrecognized is `Browsing`.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "Watching" => DisplayState::Watching,
            "Looking" => DisplayState::Looking,
            _ => DisplayState::Browsing,
        }
    }
}

/// Best-effort page metadata, populated only while watching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub title: Option<String>,
    pub episode: Option<String>,
}

impl Metadata {
    /// The empty metadata record sent for non-watching states.
    pub fn none() -> Self {
        Self {
            source: "none".into(),
            title: None,
            episode: None,
        }
    }
}

/// Diagnostic payload, ignored by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub reason: String,
}

/// One state message. Immutable once constructed.
///
/// `timestamp` marks when the current state *began* (millis since epoch), not
/// when the message was sent. It only moves on a state or URL transition, so
/// the elapsed-time display derived from it stays monotonic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMessage {
    pub display_state: DisplayState,
    pub display_title: String,
    pub metadata: Metadata,
    pub url: String,
    pub timestamp: Option<i64>,
    #[serde(rename = "_debug")]
    pub debug: DebugInfo,
}

impl StateMessage {
    /// Canonical serialized form, used for both transmission and dedup.
    pub fn to_wire(&self) -> String {
        // Struct serialization of known types cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parse an incoming text frame into a `StateMessage`.
///
/// Per-field defaults, never a panic: a missing or unrecognized
/// `displayState` is `Browsing`, a missing title is empty, missing metadata
/// is all-null, and a timestamp arrives as either a number or a numeric
/// string (anything else is absent). Unknown fields are ignored.
pub fn parse_state_message(text: &str) -> Result<StateMessage, WireError> {
    let root: Value = serde_json::from_str(text)?;
    if !root.is_object() {
        return Err(WireError::NotObject);
    }

    let display_state = root
        .get("displayState")
        .and_then(Value::as_str)
        .map(DisplayState::from_wire)
        .unwrap_or(DisplayState::Browsing);

    let display_title = root
        .get("displayTitle")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let url = root
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let debug_reason = root
        .pointer("/_debug/reason")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    Ok(StateMessage {
        display_state,
        display_title,
        metadata: parse_metadata(root.get("metadata")),
        url,
        timestamp: parse_timestamp(root.get("timestamp")),
        debug: DebugInfo {
            reason: debug_reason,
        },
    })
}

fn parse_metadata(value: Option<&Value>) -> Metadata {
    let Some(obj) = value.filter(|v| v.is_object()) else {
        return Metadata::none();
    };

    Metadata {
        source: obj
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("none")
            .to_string(),
        title: get_nonempty_str(obj, "title"),
        episode: get_nonempty_str(obj, "episode"),
    }
}

fn get_nonempty_str(obj: &Value, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accept a timestamp as an integer, a float, or a numeric string.
/// Fractional values floor; anything unparseable is absent.
fn parse_timestamp(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.floor() as i64)),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(|f| f.floor() as i64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> StateMessage {
        StateMessage {
            display_state: DisplayState::Watching,
            display_title: String::new(),
            metadata: Metadata {
                source: "dom".into(),
                title: Some("Foo".into()),
                episode: Some("Ep 3".into()),
            },
            url: "https://www.crunchyroll.com/watch/x/foo".into(),
            timestamp: Some(1_700_000_000_000),
            debug: DebugInfo {
                reason: "iframe".into(),
            },
        }
    }

    #[test]
    fn wire_shape_matches_protocol() {
        let json = sample_message().to_wire();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["displayState"], "Watching");
        assert_eq!(v["metadata"]["title"], "Foo");
        assert_eq!(v["metadata"]["episode"], "Ep 3");
        assert_eq!(v["timestamp"], 1_700_000_000_000_i64);
        assert_eq!(v["_debug"]["reason"], "iframe");
    }

    #[test]
    fn roundtrip_through_parser() {
        let msg = sample_message();
        let parsed = parse_state_message(&msg.to_wire()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn unrecognized_state_folds_to_browsing() {
        let parsed = parse_state_message(r#"{"displayState": "Paused"}"#).unwrap();
        assert_eq!(parsed.display_state, DisplayState::Browsing);

        // Missing entirely behaves the same.
        let parsed = parse_state_message("{}").unwrap();
        assert_eq!(parsed.display_state, DisplayState::Browsing);
    }

    #[test]
    fn missing_fields_default() {
        let parsed = parse_state_message(r#"{"displayState": "Looking"}"#).unwrap();
        assert_eq!(parsed.display_title, "");
        assert_eq!(parsed.metadata, Metadata::none());
        assert_eq!(parsed.timestamp, None);
        assert_eq!(parsed.debug.reason, "");
    }

    #[test]
    fn non_string_title_defaults_to_empty() {
        let parsed = parse_state_message(r#"{"displayTitle": 42}"#).unwrap();
        assert_eq!(parsed.display_title, "");
    }

    #[test]
    fn metadata_must_be_object() {
        let parsed = parse_state_message(r#"{"metadata": "dom"}"#).unwrap();
        assert_eq!(parsed.metadata, Metadata::none());

        let parsed = parse_state_message(r#"{"metadata": {"title": "Foo"}}"#).unwrap();
        assert_eq!(parsed.metadata.title.as_deref(), Some("Foo"));
        assert_eq!(parsed.metadata.episode, None);
    }

    #[test]
    fn timestamp_number_or_numeric_string() {
        let parsed = parse_state_message(r#"{"timestamp": 1700000000000}"#).unwrap();
        assert_eq!(parsed.timestamp, Some(1_700_000_000_000));

        let parsed = parse_state_message(r#"{"timestamp": "1700000000000"}"#).unwrap();
        assert_eq!(parsed.timestamp, Some(1_700_000_000_000));

        let parsed = parse_state_message(r#"{"timestamp": "1700000000000.75"}"#).unwrap();
        assert_eq!(parsed.timestamp, Some(1_700_000_000_000));

        let parsed = parse_state_message(r#"{"timestamp": "soon"}"#).unwrap();
        assert_eq!(parsed.timestamp, None);

        let parsed = parse_state_message(r#"{"timestamp": [1, 2]}"#).unwrap();
        assert_eq!(parsed.timestamp, None);
    }

    #[test]
    fn unknown_fields_tolerated() {
        let parsed = parse_state_message(
            r#"{"displayState": "Watching", "futureField": {"a": 1}, "_debug": {"reason": "x", "extra": true}}"#,
        )
        .unwrap();
        assert_eq!(parsed.display_state, DisplayState::Watching);
        assert_eq!(parsed.debug.reason, "x");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(parse_state_message("not json").is_err());
        assert!(matches!(
            parse_state_message("[1, 2, 3]"),
            Err(WireError::NotObject)
        ));
    }
}
