//! Rule evaluation - does a playback event apply to a sensor?
//!
//! Pure predicate chain over a decoded event. Predicates short-circuit in a
//! fixed order so the debug diagnostics name the first failing filter, but
//! the order does not affect the outcome. Missing event fields are treated
//! as a non-match, never an error: Plex omits whole sections on some event
//! types.

use crate::domain::event::{lookup_path, PlaybackEvent};
use crate::infra::config::SensorRule;
use tracing::debug;

/// Decide whether an event applies to a sensor
///
/// Every configured filter must pass. A sensor with no filters matches
/// every recognized playback event.
pub fn matches(event: &PlaybackEvent, rule: &SensorRule) -> bool {
    if !rule.users.is_empty() {
        let account = event.account_title.as_deref();
        if !account.is_some_and(|a| rule.users.iter().any(|u| u == a)) {
            debug!(sensor = %rule.name, account = ?account, "event_mismatch_users");
            return false;
        }
    }

    if !rule.players.is_empty() {
        // Either form of identification is accepted: stable uuid or the
        // display title shown in the Plex clients list
        let by_id = event
            .player_id
            .as_deref()
            .is_some_and(|id| rule.players.iter().any(|p| p == id));
        let by_title = event
            .player_title
            .as_deref()
            .is_some_and(|title| rule.players.iter().any(|p| p == title));
        if !by_id && !by_title {
            debug!(
                sensor = %rule.name,
                player_id = ?event.player_id,
                player_title = ?event.player_title,
                "event_mismatch_players"
            );
            return false;
        }
    }

    if !rule.types.is_empty() {
        let media_type = event.media_type.as_deref();
        if !media_type.is_some_and(|t| rule.types.iter().any(|allowed| allowed == t)) {
            debug!(sensor = %rule.name, media_type = ?media_type, "event_mismatch_types");
            return false;
        }
    }

    if !rule.genres.is_empty() {
        // Fail closed: a genre-filtered sensor never matches an event that
        // carries no genre information
        if event.genres.is_empty() {
            debug!(sensor = %rule.name, "event_mismatch_genres: no genre info");
            return false;
        }
        // Both sides are lowercased (rule at load, event at decode)
        let matched = event.genres.iter().any(|g| rule.genres.iter().any(|allowed| allowed == g));
        if !matched {
            debug!(sensor = %rule.name, genres = ?event.genres, "event_mismatch_genres");
            return false;
        }
    }

    for (path, expected) in &rule.custom_filters {
        match lookup_path(&event.raw, path) {
            Some(actual) if actual == expected => {}
            resolved => {
                debug!(
                    sensor = %rule.name,
                    path = %path,
                    resolved = ?resolved,
                    "event_mismatch_custom_filter"
                );
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::{decode, DecodeOutcome};
    use serde_json::json;
    use std::collections::HashMap;

    fn event_from(payload: serde_json::Value) -> PlaybackEvent {
        let body = payload.to_string();
        match decode(body.as_bytes()).unwrap() {
            DecodeOutcome::Event(e) => e,
            other => panic!("expected playback event, got {:?}", other),
        }
    }

    fn play_event() -> PlaybackEvent {
        event_from(json!({
            "event": "media.play",
            "Account": { "title": "Alice" },
            "Player": { "uuid": "abc-uuid", "title": "Shield TV" },
            "Metadata": {
                "type": "movie",
                "Genre": [{ "tag": "Comedy" }]
            }
        }))
    }

    fn rule(name: &str) -> SensorRule {
        SensorRule { name: name.to_string(), ..Default::default() }
    }

    #[test]
    fn test_no_filters_matches_everything() {
        assert!(matches(&play_event(), &rule("Any")));
    }

    #[test]
    fn test_users_filter() {
        let mut sensor = rule("Kids");
        sensor.users = vec!["Alice".to_string()];
        assert!(matches(&play_event(), &sensor));

        sensor.users = vec!["Bob".to_string()];
        assert!(!matches(&play_event(), &sensor));
    }

    #[test]
    fn test_users_filter_fails_without_account_section() {
        let event = event_from(json!({
            "event": "media.play",
            "Player": { "uuid": "abc-uuid" }
        }));
        let mut sensor = rule("Kids");
        sensor.users = vec!["Alice".to_string()];
        assert!(!matches(&event, &sensor));
    }

    #[test]
    fn test_players_filter_accepts_uuid_or_title() {
        let mut sensor = rule("Living Room");
        sensor.players = vec!["abc-uuid".to_string()];
        assert!(matches(&play_event(), &sensor));

        sensor.players = vec!["Shield TV".to_string()];
        assert!(matches(&play_event(), &sensor));

        sensor.players = vec!["xyz-uuid".to_string()];
        assert!(!matches(&play_event(), &sensor));
    }

    #[test]
    fn test_types_filter() {
        let mut sensor = rule("Movies");
        sensor.types = vec!["movie".to_string()];
        assert!(matches(&play_event(), &sensor));

        sensor.types = vec!["episode".to_string()];
        assert!(!matches(&play_event(), &sensor));
    }

    #[test]
    fn test_genres_filter_case_insensitive_intersection() {
        // Rule genres are lowercased at config load
        let mut sensor = rule("Comedies");
        sensor.genres = vec!["comedy".to_string()];
        assert!(matches(&play_event(), &sensor));

        sensor.genres = vec!["horror".to_string()];
        assert!(!matches(&play_event(), &sensor));
    }

    #[test]
    fn test_genres_filter_fails_closed_without_genre_info() {
        let event = event_from(json!({
            "event": "media.play",
            "Player": { "uuid": "abc-uuid" },
            "Metadata": { "type": "movie" }
        }));
        let mut sensor = rule("Comedies");
        sensor.genres = vec!["comedy".to_string()];
        assert!(!matches(&event, &sensor));

        // Explicitly empty genre list fails the same way
        let event = event_from(json!({
            "event": "media.play",
            "Metadata": { "type": "movie", "Genre": [] }
        }));
        assert!(!matches(&event, &sensor));
    }

    #[test]
    fn test_custom_filter_equality() {
        let mut sensor = rule("Movies only");
        sensor.custom_filters =
            HashMap::from([("Metadata.type".to_string(), json!("movie"))]);
        assert!(matches(&play_event(), &sensor));

        sensor.custom_filters =
            HashMap::from([("Metadata.type".to_string(), json!("episode"))]);
        assert!(!matches(&play_event(), &sensor));
    }

    #[test]
    fn test_custom_filter_missing_path_is_non_match() {
        let event = event_from(json!({
            "event": "media.play",
            "Player": { "uuid": "abc-uuid" }
        }));
        let mut sensor = rule("Movies only");
        sensor.custom_filters =
            HashMap::from([("Metadata.type".to_string(), json!("movie"))]);
        assert!(!matches(&event, &sensor));
    }

    #[test]
    fn test_all_filters_must_pass() {
        let mut sensor = rule("Strict");
        sensor.users = vec!["Alice".to_string()];
        sensor.players = vec!["abc-uuid".to_string()];
        sensor.types = vec!["movie".to_string()];
        sensor.genres = vec!["comedy".to_string()];
        sensor.custom_filters =
            HashMap::from([("Player.title".to_string(), json!("Shield TV"))]);
        assert!(matches(&play_event(), &sensor));

        sensor.types = vec!["track".to_string()];
        assert!(!matches(&play_event(), &sensor));
    }
}
