//! Integration tests for configuration loading

use plex_presence::infra::Config;
use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(
        r#"
[server]
port = 23000
delay_off_ms = 5000
log_seen_players_and_users = true

[mqtt]
host = "broker.local"
port = 1884
topic_prefix = "home/plex"

[metrics]
prometheus_port = 9191

[registry]
file = "state/sensors.json"

[[sensors]]
name = "Living Room"
players = ["abc-uuid", "Shield TV"]

[[sensors]]
name = "Kids"
users = ["Alice"]
genres = ["Comedy", "Animation"]
ignore_pause_resume = true

[sensors.custom_filters]
"Metadata.type" = "movie"
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.port(), 23000);
    assert_eq!(config.delay_off_ms(), 5000);
    assert!(config.log_seen_players_and_users());
    assert!(!config.debug());
    assert_eq!(config.mqtt_host(), "broker.local");
    assert_eq!(config.mqtt_port(), 1884);
    assert_eq!(config.mqtt_topic_prefix(), "home/plex");
    assert_eq!(config.prometheus_port(), 9191);
    assert_eq!(config.registry_file(), "state/sensors.json");

    let sensors = config.sensors();
    assert_eq!(sensors.len(), 2);
    assert_eq!(sensors[0].name, "Living Room");
    assert_eq!(sensors[0].players, vec!["abc-uuid", "Shield TV"]);
    assert!(!sensors[0].ignore_pause_resume);

    assert_eq!(sensors[1].name, "Kids");
    assert_eq!(sensors[1].users, vec!["Alice"]);
    // Genres are folded to lowercase at load
    assert_eq!(sensors[1].genres, vec!["comedy", "animation"]);
    assert!(sensors[1].ignore_pause_resume);
    assert_eq!(sensors[1].custom_filters.get("Metadata.type"), Some(&json!("movie")));
}

#[test]
fn test_defaults_with_minimal_config() {
    let temp_file = write_config(
        r#"
[[sensors]]
name = "Anything"
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.port(), 22987);
    assert_eq!(config.delay_off_ms(), 0);
    assert!(!config.log_seen_players_and_users());
    assert!(config.mqtt_enabled());
    assert!(!config.broker_enabled());
    assert_eq!(config.prometheus_port(), 9090);
    assert_eq!(config.registry_file(), "sensors.json");
    assert_eq!(config.sensors().len(), 1);
    assert!(config.sensors()[0].users.is_empty());
    assert!(config.sensors()[0].custom_filters.is_empty());
}

#[test]
fn test_duplicate_sensor_names_rejected() {
    let temp_file = write_config(
        r#"
[[sensors]]
name = "Living Room"

[[sensors]]
name = "Living Room"
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("duplicate sensor name"));
}

#[test]
fn test_missing_file_fails_with_context() {
    let err = Config::from_file("does/not/exist.toml").unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read config file"));
}

#[test]
fn test_malformed_toml_fails_with_context() {
    let temp_file = write_config("[[sensors]\nname=");
    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config file"));
}
