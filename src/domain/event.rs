//! Playback event model and webhook payload decoding
//!
//! Plex delivers webhooks as multipart form data with the JSON payload
//! embedded in the body. The decoder bounds the payload by the first `{`
//! and the following newline and parses only that span; everything else in
//! the body is ignored.

use serde_json::Value;
use tracing::debug;

/// Recognized playback event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Play,
    Resume,
    Pause,
    Stop,
}

impl EventKind {
    /// Map a Plex `event` field value to a playback kind
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "media.play" => Some(EventKind::Play),
            "media.resume" => Some(EventKind::Resume),
            "media.pause" => Some(EventKind::Pause),
            "media.stop" => Some(EventKind::Stop),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Play => "play",
            EventKind::Resume => "resume",
            EventKind::Pause => "pause",
            EventKind::Stop => "stop",
        }
    }

    /// Play and resume hold a sensor on; stop and pause release it
    #[inline]
    pub fn is_start(&self) -> bool {
        matches!(self, EventKind::Play | EventKind::Resume)
    }

    /// Pause and resume are subject to the `ignore_pause_resume` rule flag
    #[inline]
    pub fn is_pause_resume(&self) -> bool {
        matches!(self, EventKind::Pause | EventKind::Resume)
    }
}

/// A decoded playback webhook event
///
/// Field extraction never fails: Plex omits sections on some event types
/// (e.g. no `Account` on server-owned events), so every extracted field is
/// optional. `raw` keeps the full payload for custom dotted-path filters.
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub kind: EventKind,
    /// Stable client identifier (`Player.uuid`)
    pub player_id: Option<String>,
    /// Human-readable client name (`Player.title`)
    pub player_title: Option<String>,
    /// User associated with playback (`Account.title`)
    pub account_title: Option<String>,
    /// Content type (`Metadata.type`: movie, episode, track, ...)
    pub media_type: Option<String>,
    /// Lowercased genre tags (`Metadata.Genre[].tag`), empty when absent
    pub genres: Vec<String>,
    /// Full decoded payload for custom filter lookups
    pub raw: Value,
}

impl PlaybackEvent {
    fn from_value(kind: EventKind, raw: Value) -> Self {
        let player_id = string_at(&raw, &["Player", "uuid"]);
        let player_title = string_at(&raw, &["Player", "title"]);
        let account_title = string_at(&raw, &["Account", "title"]);
        let media_type = string_at(&raw, &["Metadata", "type"]);

        let genres = raw
            .get("Metadata")
            .and_then(|m| m.get("Genre"))
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|g| g.get("tag").and_then(Value::as_str))
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default();

        Self { kind, player_id, player_title, account_title, media_type, genres, raw }
    }
}

fn string_at(root: &Value, keys: &[&str]) -> Option<String> {
    let mut value = root;
    for key in keys {
        value = value.get(key)?;
    }
    value.as_str().map(str::to_string)
}

/// Result of decoding a webhook body that contained valid JSON
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A recognized playback event, ready for dispatch
    Event(PlaybackEvent),
    /// Valid payload with a non-playback `event` type (library.new, ...)
    Ignored(String),
}

/// Decode a raw webhook body into a playback event
///
/// Returns `None` when the body carries no parseable JSON. Malformed
/// payloads are a normal occurrence (health checks, stray requests) and are
/// logged at debug level only.
pub fn decode(raw_body: &[u8]) -> Option<DecodeOutcome> {
    let body = std::str::from_utf8(raw_body).ok()?;
    let start = body.find('{')?;
    let end = body[start..].find('\n').map_or(body.len(), |n| start + n);
    let span = &body[start..end];

    let raw: Value = match serde_json::from_str(span) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "webhook_body_not_json");
            return None;
        }
    };

    let name = raw.get("event").and_then(Value::as_str).unwrap_or_default();
    match EventKind::from_event_name(name) {
        Some(kind) => Some(DecodeOutcome::Event(PlaybackEvent::from_value(kind, raw))),
        None => Some(DecodeOutcome::Ignored(name.to_string())),
    }
}

/// Resolve a dotted property path (e.g. `Metadata.type`) against a payload
///
/// Sequential key lookup; an absent intermediate key yields `None`, never
/// a panic.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |value, key| value.get(key))
}
