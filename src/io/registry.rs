//! Sensor registry - which sensors were registered on previous runs
//!
//! A small JSON file records every sensor the service has published, with a
//! stable id derived from the name. At startup the configured sensor list
//! is reconciled against it: sensors that disappeared from configuration
//! are reported so their retained bridge state can be cleared, and the file
//! is rewritten with the current set. Runtime sensor state is never
//! persisted, only the identities.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// One registered sensor identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredSensor {
    pub name: String,
    /// Stable id derived from the name; equal names always map to the
    /// same id across restarts
    pub id: String,
}

impl RegisteredSensor {
    pub fn from_name(name: &str) -> Self {
        Self { name: name.to_string(), id: sensor_id(name) }
    }
}

/// Derive the stable sensor id from its display name
pub fn sensor_id(name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// Result of reconciling configuration against the registry file
#[derive(Debug, Default, PartialEq)]
pub struct RegistryDiff {
    /// Configured sensors not seen before
    pub added: Vec<String>,
    /// Configured sensors already registered
    pub retained: Vec<String>,
    /// Previously registered sensors no longer in configuration; the
    /// caller clears their published state
    pub removed: Vec<String>,
}

/// File-backed sensor registry
pub struct Registry {
    file_path: String,
}

impl Registry {
    pub fn new(file_path: &str) -> Self {
        Self { file_path: file_path.to_string() }
    }

    /// Load the registered sensor set
    ///
    /// A missing file is a first run and yields an empty set. A corrupt
    /// file is logged and treated as empty; it gets rewritten on the next
    /// reconcile.
    pub fn load(&self) -> Vec<RegisteredSensor> {
        let path = Path::new(&self.file_path);
        if !path.exists() {
            return Vec::new();
        }
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(sensors) => sensors,
                Err(e) => {
                    warn!(file = %self.file_path, error = %e, "registry_file_corrupt");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(file = %self.file_path, error = %e, "registry_file_unreadable");
                Vec::new()
            }
        }
    }

    /// Reconcile the configured sensor names against the registry
    ///
    /// Rewrites the file with the configured set and returns the diff.
    pub fn reconcile(&self, configured: &[String]) -> anyhow::Result<RegistryDiff> {
        let known = self.load();

        let mut diff = RegistryDiff::default();
        for name in configured {
            if known.iter().any(|s| &s.name == name) {
                diff.retained.push(name.clone());
            } else {
                diff.added.push(name.clone());
            }
        }
        for sensor in &known {
            if !configured.contains(&sensor.name) {
                diff.removed.push(sensor.name.clone());
            }
        }

        let current: Vec<RegisteredSensor> =
            configured.iter().map(|name| RegisteredSensor::from_name(name)).collect();
        self.write(&current)?;

        info!(
            added = %diff.added.len(),
            retained = %diff.retained.len(),
            removed = %diff.removed.len(),
            "registry_reconciled"
        );
        Ok(diff)
    }

    fn write(&self, sensors: &[RegisteredSensor]) -> anyhow::Result<()> {
        let path = Path::new(&self.file_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(sensors)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write registry file {}", self.file_path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sensor_id_is_stable() {
        assert_eq!(sensor_id("Living Room"), sensor_id("Living Room"));
        assert_ne!(sensor_id("Living Room"), sensor_id("Bedroom"));
    }

    #[test]
    fn test_first_run_registers_all() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sensors.json");
        let registry = Registry::new(path.to_str().unwrap());

        let diff = registry.reconcile(&names(&["Living Room", "Kids"])).unwrap();
        assert_eq!(diff.added, names(&["Living Room", "Kids"]));
        assert!(diff.retained.is_empty());
        assert!(diff.removed.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_second_run_retains() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sensors.json");
        let registry = Registry::new(path.to_str().unwrap());

        registry.reconcile(&names(&["Living Room"])).unwrap();
        let diff = registry.reconcile(&names(&["Living Room"])).unwrap();
        assert!(diff.added.is_empty());
        assert_eq!(diff.retained, names(&["Living Room"]));
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_dropped_sensor_is_reported_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sensors.json");
        let registry = Registry::new(path.to_str().unwrap());

        registry.reconcile(&names(&["Living Room", "Kids"])).unwrap();
        let diff = registry.reconcile(&names(&["Living Room"])).unwrap();
        assert!(diff.added.is_empty());
        assert_eq!(diff.retained, names(&["Living Room"]));
        assert_eq!(diff.removed, names(&["Kids"]));

        // The file no longer mentions the removed sensor
        let reloaded = registry.load();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].name, "Living Room");
    }

    #[test]
    fn test_corrupt_file_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sensors.json");
        std::fs::write(&path, "not json at all").unwrap();

        let registry = Registry::new(path.to_str().unwrap());
        assert!(registry.load().is_empty());

        let diff = registry.reconcile(&names(&["Living Room"])).unwrap();
        assert_eq!(diff.added, names(&["Living Room"]));
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("state").join("sensors.json");
        let registry = Registry::new(nested.to_str().unwrap());

        registry.reconcile(&names(&["Living Room"])).unwrap();
        assert!(nested.exists());
    }
}
