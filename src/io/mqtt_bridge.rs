//! MQTT publisher for sensor occupancy state
//!
//! The accessory-bridge side of the service: occupancy transitions are
//! published retained to `<prefix>/<sensor>/state` as `ON`/`OFF` so
//! home-automation consumers (Home Assistant binary_sensor, Node-RED, ...)
//! see the current value on subscribe. Removing a sensor clears its
//! retained topic with an empty payload.

use crate::infra::config::Config;
use crate::io::bridge::BridgeMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// MQTT publisher actor
///
/// Receives messages from the bridge channel and publishes to MQTT.
pub struct MqttBridge {
    client: AsyncClient,
    rx: mpsc::Receiver<BridgeMessage>,
    topic_prefix: String,
}

impl MqttBridge {
    /// Create a new MQTT bridge publisher
    ///
    /// Connects to the broker at the configured MQTT host/port.
    pub fn new(config: &Config, rx: mpsc::Receiver<BridgeMessage>) -> Self {
        let client_id = format!("plex-presence-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_bridge_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_bridge_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, rx, topic_prefix: config.mqtt_topic_prefix().to_string() }
    }

    fn state_topic(&self, sensor: &str) -> String {
        format!("{}/{}/state", self.topic_prefix, sensor)
    }

    /// Run the publisher loop until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(topic_prefix = %self.topic_prefix, "mqtt_bridge_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_bridge_shutdown");
                        // Drain remaining transitions so the last value wins
                        while let Ok(msg) = self.rx.try_recv() {
                            self.publish_message(msg).await;
                        }
                        return;
                    }
                }
                Some(msg) = self.rx.recv() => {
                    self.publish_message(msg).await;
                }
            }
        }
    }

    async fn publish_message(&self, msg: BridgeMessage) {
        match msg {
            BridgeMessage::State { sensor, occupied } => {
                let topic = self.state_topic(&sensor);
                let payload: &[u8] = if occupied { b"ON" } else { b"OFF" };
                // QoS 1 and retained: the current value must survive
                // consumer reconnects
                if let Err(e) =
                    self.client.publish(&topic, QoS::AtLeastOnce, true, payload).await
                {
                    error!(sensor = %sensor, error = %e, "mqtt_state_publish_failed");
                } else {
                    debug!(topic = %topic, occupied = %occupied, "mqtt_state_published");
                }
            }
            BridgeMessage::Remove { sensor } => {
                let topic = self.state_topic(&sensor);
                // Empty retained payload clears the topic on the broker
                if let Err(e) =
                    self.client.publish(&topic, QoS::AtLeastOnce, true, Vec::new()).await
                {
                    error!(sensor = %sensor, error = %e, "mqtt_clear_publish_failed");
                } else {
                    info!(sensor = %sensor, "mqtt_sensor_removed");
                }
            }
        }
    }
}
