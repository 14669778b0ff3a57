//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `webhook` - HTTP listener for Plex webhook deliveries
//! - `bridge` - Typed channel carrying occupancy transitions to the bridge
//! - `mqtt_bridge` - MQTT publisher for sensor state
//! - `registry` - File-backed record of registered sensors
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod bridge;
pub mod mqtt_bridge;
pub mod prometheus;
pub mod registry;
pub mod webhook;

// Re-export commonly used types
pub use bridge::{create_bridge_channel, BridgeMessage, BridgeSender};
pub use mqtt_bridge::MqttBridge;
pub use registry::{Registry, RegistryDiff};
pub use webhook::start_webhook_listener;
