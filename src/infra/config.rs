//! Configuration loading from TOML files
//!
//! Sensor definitions and process-wide options live in one TOML file,
//! selected via the --config command line argument. Loading fails loudly on
//! invalid config: sensor matching and registry reconciliation both key on
//! sensor names, so duplicates are rejected up front.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// One occupancy sensor definition
///
/// Empty filter lists allow all; a sensor with no filters matches every
/// recognized playback event. Genre values are lowercased at load time so
/// matching is case-insensitive.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorRule {
    /// Unique display name, also the stable identity key for the registry
    pub name: String,
    /// Allowed account titles
    #[serde(default)]
    pub users: Vec<String>,
    /// Allowed players, by uuid or display title
    #[serde(default)]
    pub players: Vec<String>,
    /// Allowed media types (movie, episode, track, ...)
    #[serde(default)]
    pub types: Vec<String>,
    /// Allowed genre tags, matched case-insensitively
    #[serde(default)]
    pub genres: Vec<String>,
    /// Dotted property path -> required literal value, checked against the
    /// raw event payload
    #[serde(default)]
    pub custom_filters: HashMap<String, serde_json::Value>,
    /// When true, pause and resume events are no-ops for this sensor
    #[serde(default)]
    pub ignore_pause_resume: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Webhook listener port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Debounce delay before an off-transition is published (ms)
    #[serde(default)]
    pub delay_off_ms: u64,
    /// Log player/user identity on every play event, for config discovery
    #[serde(default)]
    pub log_seen_players_and_users: bool,
    /// Raise the default log filter to debug
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            delay_off_ms: 0,
            log_seen_players_and_users: false,
            debug: false,
        }
    }
}

fn default_port() -> u16 {
    22987
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Enable MQTT publishing of sensor state
    #[serde(default = "default_mqtt_enabled")]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Sensor state is published to <topic_prefix>/<sensor name>/state
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: default_mqtt_enabled(),
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            topic_prefix: default_topic_prefix(),
            username: None,
            password: None,
        }
    }
}

fn default_mqtt_enabled() -> bool {
    true
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic_prefix() -> String {
    "plex-presence/sensor".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Run an embedded MQTT broker so no external one is required
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { enabled: false, bind_address: default_broker_bind_address(), port: 1883 }
    }
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { prometheus_port: default_prometheus_port() }
    }
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// JSON file recording registered sensors across restarts
    #[serde(default = "default_registry_file")]
    pub file: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { file: default_registry_file() }
    }
}

fn default_registry_file() -> String {
    "sensors.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    mqtt: MqttConfig,
    #[serde(default)]
    broker: BrokerConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    registry: RegistryConfig,
    #[serde(default)]
    sensors: Vec<SensorRule>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone, Default)]
pub struct Config {
    server: ServerConfig,
    mqtt: MqttConfig,
    broker: BrokerConfig,
    metrics: MetricsConfig,
    registry: RegistryConfig,
    sensors: Vec<SensorRule>,
    config_file: String,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Fails on unreadable/unparseable files and on invalid sensor sets;
    /// a misconfigured sensor list must never start silently.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let sensors = validate_sensors(toml_config.sensors)?;

        Ok(Self {
            server: toml_config.server,
            mqtt: toml_config.mqtt,
            broker: toml_config.broker,
            metrics: toml_config.metrics,
            registry: toml_config.registry,
            sensors,
            config_file: path.display().to_string(),
        })
    }

    pub fn port(&self) -> u16 {
        self.server.port
    }

    pub fn delay_off_ms(&self) -> u64 {
        self.server.delay_off_ms
    }

    pub fn log_seen_players_and_users(&self) -> bool {
        self.server.log_seen_players_and_users
    }

    pub fn debug(&self) -> bool {
        self.server.debug
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt.enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt.host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt.port
    }

    pub fn mqtt_topic_prefix(&self) -> &str {
        &self.mqtt.topic_prefix
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt.username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt.password.as_deref()
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker.enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker.bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker.port
    }

    pub fn prometheus_port(&self) -> u16 {
        self.metrics.prometheus_port
    }

    pub fn registry_file(&self) -> &str {
        &self.registry.file
    }

    pub fn sensors(&self) -> &[SensorRule] {
        &self.sensors
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the sensor list
    #[cfg(test)]
    pub fn with_sensors(mut self, sensors: Vec<SensorRule>) -> Self {
        self.sensors = sensors;
        self
    }
}

/// Reject duplicate sensor names and fold genre values to lowercase
fn validate_sensors(mut sensors: Vec<SensorRule>) -> anyhow::Result<Vec<SensorRule>> {
    let mut seen = HashSet::new();
    for sensor in &sensors {
        if sensor.name.trim().is_empty() {
            bail!("sensor with empty name in config");
        }
        if !seen.insert(sensor.name.clone()) {
            bail!("duplicate sensor name in config: {:?}", sensor.name);
        }
    }

    for sensor in &mut sensors {
        for genre in &mut sensor.genres {
            *genre = genre.to_lowercase();
        }
    }

    Ok(sensors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> SensorRule {
        SensorRule { name: name.to_string(), ..Default::default() }
    }

    #[test]
    fn test_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.port, 22987);
        assert_eq!(server.delay_off_ms, 0);
        assert!(!server.log_seen_players_and_users);

        let mqtt = MqttConfig::default();
        assert!(mqtt.enabled);
        assert_eq!(mqtt.topic_prefix, "plex-presence/sensor");

        assert_eq!(MetricsConfig::default().prometheus_port, 9090);
        assert_eq!(RegistryConfig::default().file, "sensors.json");
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let result = validate_sensors(vec![named("Living Room"), named("Living Room")]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("duplicate sensor name"), "unexpected error: {err}");
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        assert!(validate_sensors(vec![named("  ")]).is_err());
    }

    #[test]
    fn test_validate_lowercases_genres() {
        let mut sensor = named("Movies");
        sensor.genres = vec!["Comedy".to_string(), "SCI-FI".to_string()];
        let sensors = validate_sensors(vec![sensor]).unwrap();
        assert_eq!(sensors[0].genres, vec!["comedy", "sci-fi"]);
    }
}
