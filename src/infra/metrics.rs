//! Lock-free metrics collection
//!
//! Counters are relaxed atomics updated from the hot path; the per-sensor
//! occupancy gauge map is read-mostly and guarded by a parking_lot RwLock.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Metrics collector shared across tasks via Arc
pub struct Metrics {
    /// Webhook bodies received by the listener
    webhooks_received: AtomicU64,
    /// Webhook bodies dropped because the dispatch queue was full
    webhooks_dropped: AtomicU64,
    /// Bodies that carried no parseable JSON payload
    bodies_unparseable: AtomicU64,
    /// Recognized playback events dispatched to sensors
    events_dispatched: AtomicU64,
    /// Valid payloads with a non-playback event type
    events_ignored: AtomicU64,
    /// Occupancy transitions published to the sink
    transitions_total: AtomicU64,
    /// Current occupancy per sensor name
    occupancy: RwLock<FxHashMap<String, bool>>,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            webhooks_received: AtomicU64::new(0),
            webhooks_dropped: AtomicU64::new(0),
            bodies_unparseable: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            transitions_total: AtomicU64::new(0),
            occupancy: RwLock::new(FxHashMap::default()),
            started_at: Instant::now(),
        }
    }

    /// Pre-register sensors so the gauge exports a row per configured sensor
    /// even before any event arrives
    pub fn set_sensors(&self, names: &[String]) {
        let mut occupancy = self.occupancy.write();
        for name in names {
            occupancy.insert(name.clone(), false);
        }
    }

    pub fn record_webhook_received(&self) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_webhook_dropped(&self) {
        self.webhooks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_body_unparseable(&self) {
        self.bodies_unparseable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self, sensor: &str, occupied: bool) {
        self.transitions_total.fetch_add(1, Ordering::Relaxed);
        self.occupancy.write().insert(sensor.to_string(), occupied);
    }

    /// Snapshot of the per-sensor occupancy gauge, sorted by name for
    /// stable export ordering
    pub fn occupancy(&self) -> Vec<(String, bool)> {
        let mut rows: Vec<(String, bool)> =
            self.occupancy.read().iter().map(|(name, &v)| (name.clone(), v)).collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Produce a point-in-time summary of all counters
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            webhooks_received: self.webhooks_received.load(Ordering::Relaxed),
            webhooks_dropped: self.webhooks_dropped.load(Ordering::Relaxed),
            bodies_unparseable: self.bodies_unparseable.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            transitions_total: self.transitions_total.load(Ordering::Relaxed),
            sensors_occupied: self.occupancy.read().values().filter(|&&v| v).count() as u64,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time counter snapshot
#[derive(Debug, Clone, Copy)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub webhooks_received: u64,
    pub webhooks_dropped: u64,
    pub bodies_unparseable: u64,
    pub events_dispatched: u64,
    pub events_ignored: u64,
    pub transitions_total: u64,
    pub sensors_occupied: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            webhooks = %self.webhooks_received,
            dropped = %self.webhooks_dropped,
            unparseable = %self.bodies_unparseable,
            dispatched = %self.events_dispatched,
            ignored = %self.events_ignored,
            transitions = %self.transitions_total,
            occupied = %self.sensors_occupied,
            "metrics_summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_webhook_received();
        metrics.record_webhook_received();
        metrics.record_event_dispatched();
        metrics.record_event_ignored();

        let summary = metrics.report();
        assert_eq!(summary.webhooks_received, 2);
        assert_eq!(summary.events_dispatched, 1);
        assert_eq!(summary.events_ignored, 1);
        assert_eq!(summary.transitions_total, 0);
    }

    #[test]
    fn test_occupancy_gauge_tracks_transitions() {
        let metrics = Metrics::new();
        metrics.set_sensors(&["Bedroom".to_string(), "Living Room".to_string()]);

        metrics.record_transition("Living Room", true);

        let rows = metrics.occupancy();
        assert_eq!(rows, vec![("Bedroom".to_string(), false), ("Living Room".to_string(), true)]);
        assert_eq!(metrics.report().sensors_occupied, 1);

        metrics.record_transition("Living Room", false);
        assert_eq!(metrics.report().sensors_occupied, 0);
        assert_eq!(metrics.report().transitions_total, 2);
    }
}
