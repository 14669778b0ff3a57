//! Typed channel for sensor output transitions
//!
//! The dispatcher talks to the accessory layer exclusively through this
//! channel: occupancy edges and sensor removals go in, the MQTT publisher
//! drains them. Bounded and non-blocking - if the consumer falls behind,
//! messages are dropped rather than stalling event processing.

use tokio::sync::mpsc;
use tracing::warn;

/// Messages handed to the accessory bridge publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMessage {
    /// A sensor's occupancy value changed
    State { sensor: String, occupied: bool },
    /// A sensor was dropped from configuration; clear its retained state
    Remove { sensor: String },
}

/// Sender handle for bridge messages
///
/// Clone this to share across producers.
#[derive(Clone)]
pub struct BridgeSender {
    tx: mpsc::Sender<BridgeMessage>,
}

impl BridgeSender {
    pub fn new(tx: mpsc::Sender<BridgeMessage>) -> Self {
        Self { tx }
    }

    /// Publish an occupancy transition
    pub fn send_state(&self, sensor: &str, occupied: bool) {
        let msg = BridgeMessage::State { sensor: sensor.to_string(), occupied };
        if self.tx.try_send(msg).is_err() {
            warn!(sensor = %sensor, "bridge_state_dropped: channel full or closed");
        }
    }

    /// Request removal of a sensor no longer present in configuration
    pub fn send_remove(&self, sensor: &str) {
        let msg = BridgeMessage::Remove { sensor: sensor.to_string() };
        if self.tx.try_send(msg).is_err() {
            warn!(sensor = %sensor, "bridge_remove_dropped: channel full or closed");
        }
    }
}

/// Create a new bridge channel pair
pub fn create_bridge_channel(buffer_size: usize) -> (BridgeSender, mpsc::Receiver<BridgeMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (BridgeSender::new(tx), rx)
}
