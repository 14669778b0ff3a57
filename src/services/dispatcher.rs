//! Event dispatch - webhook bodies in, occupancy transitions out
//!
//! The Dispatcher is the single consumer of a serialized message queue, so
//! sensor state is only ever mutated from one task. Two message kinds flow
//! through the queue: raw webhook bodies from the HTTP listener and
//! off-timer expirations sent back by the dispatcher's own sleep tasks.
//! Routing the timers through the same queue keeps every state mutation on
//! one thread and makes cancellation exact: a timer that raced past its
//! abort is rejected by its stale generation.

use crate::domain::event::{decode, DecodeOutcome, EventKind, PlaybackEvent};
use crate::infra::config::{Config, SensorRule};
use crate::infra::metrics::Metrics;
use crate::io::bridge::BridgeSender;
use crate::services::presence::SensorState;
use crate::services::rules;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Messages consumed by the dispatcher loop
#[derive(Debug)]
pub enum DispatchMsg {
    /// Raw webhook body, buffered by the HTTP listener
    Webhook(Bytes),
    /// A scheduled off-delay elapsed for the sensor at this index
    OffElapsed { sensor: usize, generation: u64 },
}

/// One configured sensor: its rule, runtime state, and pending off-timer
struct Sensor {
    rule: SensorRule,
    state: SensorState,
    /// Last value handed to the bridge; transitions publish only on change
    published: bool,
    /// At most one outstanding delayed off-transition task
    pending_off: Option<JoinHandle<()>>,
}

impl Sensor {
    fn new(rule: SensorRule) -> Self {
        Self { rule, state: SensorState::new(), published: false, pending_off: None }
    }
}

/// Central event processor driving all sensors
pub struct Dispatcher {
    sensors: Vec<Sensor>,
    bridge: Option<BridgeSender>,
    metrics: Arc<Metrics>,
    delay_off: Duration,
    log_seen_players_and_users: bool,
    /// Loops timer expirations back into the dispatch queue
    self_tx: mpsc::Sender<DispatchMsg>,
}

impl Dispatcher {
    /// Create a dispatcher over the configured sensors
    ///
    /// `self_tx` must be the sender side of the queue later passed to
    /// [`run`], so off-timers land behind any webhook already in flight.
    ///
    /// [`run`]: Dispatcher::run
    pub fn new(
        config: &Config,
        bridge: Option<BridgeSender>,
        metrics: Arc<Metrics>,
        self_tx: mpsc::Sender<DispatchMsg>,
    ) -> Self {
        let sensors = config.sensors().iter().cloned().map(Sensor::new).collect();
        Self {
            sensors,
            bridge,
            metrics,
            delay_off: Duration::from_millis(config.delay_off_ms()),
            // Debug mode implies identity logging, as an aid while writing
            // sensor rules
            log_seen_players_and_users: config.log_seen_players_and_users() || config.debug(),
            self_tx,
        }
    }

    /// Publish the initial unoccupied baseline for every sensor
    ///
    /// Called once at startup so retained bridge topics exist before the
    /// first event arrives.
    pub fn publish_initial_state(&self) {
        if let Some(ref bridge) = self.bridge {
            for sensor in &self.sensors {
                bridge.send_state(&sensor.rule.name, false);
            }
        }
    }

    /// Consume messages until the channel closes or shutdown is signaled
    pub async fn run(
        &mut self,
        mut rx: mpsc::Receiver<DispatchMsg>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(msg) => self.handle_message(msg),
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("dispatcher_shutdown");
                        break;
                    }
                }
            }
        }
    }

    fn handle_message(&mut self, msg: DispatchMsg) {
        match msg {
            DispatchMsg::Webhook(body) => self.handle_webhook(&body),
            DispatchMsg::OffElapsed { sensor, generation } => {
                self.handle_off_elapsed(sensor, generation);
            }
        }
    }

    /// Decode a webhook body and drive every matching sensor
    ///
    /// Malformed bodies and non-playback events are terminal, non-erroring
    /// outcomes; nothing here ever propagates to the listener.
    fn handle_webhook(&mut self, body: &[u8]) {
        let event = match decode(body) {
            None => {
                self.metrics.record_body_unparseable();
                return;
            }
            Some(DecodeOutcome::Ignored(name)) => {
                self.metrics.record_event_ignored();
                debug!(event = %name, "non_playback_event_ignored");
                return;
            }
            Some(DecodeOutcome::Event(event)) => event,
        };

        self.metrics.record_event_dispatched();
        debug!(kind = %event.kind.as_str(), player = ?event.player_id, "playback_event");

        // Config discovery aid: surface identities on every play,
        // regardless of whether any sensor matches
        if self.log_seen_players_and_users && event.kind == EventKind::Play {
            info!(
                player_title = %event.player_title.as_deref().unwrap_or("<unknown>"),
                player_uuid = %event.player_id.as_deref().unwrap_or("<unknown>"),
                user = %event.account_title.as_deref().unwrap_or("<unknown>"),
                "seen_player_and_user"
            );
        }

        // Configuration order; every matching sensor updates independently
        for idx in 0..self.sensors.len() {
            if rules::matches(&event, &self.sensors[idx].rule) {
                self.apply_event(idx, &event);
            }
        }
    }

    /// Apply a matched event to one sensor's presence state
    fn apply_event(&mut self, idx: usize, event: &PlaybackEvent) {
        let sensor = &mut self.sensors[idx];

        if event.kind.is_pause_resume() && sensor.rule.ignore_pause_resume {
            debug!(sensor = %sensor.rule.name, kind = %event.kind.as_str(), "pause_resume_ignored");
            return;
        }

        let Some(player_id) = event.player_id.as_deref() else {
            debug!(sensor = %sensor.rule.name, "event_without_player_uuid_skipped");
            return;
        };

        if event.kind.is_start() {
            if let Some(pending) = sensor.pending_off.take() {
                pending.abort();
            }
            if sensor.state.player_started(player_id) {
                debug!(sensor = %sensor.rule.name, player = %player_id, "sensor_on");
            }
            self.set_occupied(idx, true);
        } else if let Some(generation) = self.sensors[idx].state.player_stopped(player_id) {
            self.schedule_off(idx, generation);
        }
    }

    /// Schedule the delayed off-transition, replacing any pending one
    fn schedule_off(&mut self, idx: usize, generation: u64) {
        let delay = self.delay_off;
        let tx = self.self_tx.clone();
        debug!(
            sensor = %self.sensors[idx].rule.name,
            delay_ms = %delay.as_millis(),
            "sensor_off_scheduled"
        );

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(DispatchMsg::OffElapsed { sensor: idx, generation }).await;
        });

        if let Some(previous) = self.sensors[idx].pending_off.replace(handle) {
            previous.abort();
        }
    }

    fn handle_off_elapsed(&mut self, idx: usize, generation: u64) {
        let Some(sensor) = self.sensors.get_mut(idx) else {
            return;
        };
        if sensor.state.off_due(generation) {
            sensor.pending_off = None;
            debug!(sensor = %sensor.rule.name, "sensor_off");
            self.set_occupied(idx, false);
        } else {
            debug!(sensor = %sensor.rule.name, "stale_off_timer_ignored");
        }
    }

    /// Hand a value to the bridge, but only on change
    fn set_occupied(&mut self, idx: usize, occupied: bool) {
        let sensor = &mut self.sensors[idx];
        if sensor.published == occupied {
            return;
        }
        sensor.published = occupied;
        self.metrics.record_transition(&sensor.rule.name, occupied);
        info!(sensor = %sensor.rule.name, occupied = %occupied, "occupancy_changed");
        if let Some(ref bridge) = self.bridge {
            bridge.send_state(&sensor.rule.name, occupied);
        }
    }
}
