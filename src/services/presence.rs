//! Per-sensor presence state machine
//!
//! Tracks the set of players currently holding a sensor occupied and turns
//! discrete play/resume/pause/stop events into occupied/unoccupied edges
//! with a debounced off-transition.
//!
//! Key behaviors:
//! - The sensor is occupied iff the active-player set is non-empty
//! - A start for an already-active player is a no-op (set semantics)
//! - Emptying the set does not turn the sensor off directly; it hands the
//!   caller a generation token to schedule a delayed off with
//! - Any start cancels a pending off by advancing the generation, so a
//!   stale timer firing afterwards is rejected
//!
//! The machine is deliberately timer-free: the dispatcher owns the actual
//! sleep tasks, which keeps this logic synchronous and unit-testable.

use std::collections::HashSet;
use tracing::debug;

/// Runtime state for one configured sensor, never persisted
#[derive(Debug, Default)]
pub struct SensorState {
    /// Player ids currently holding this sensor occupied
    active_players: HashSet<String>,
    /// Advances whenever a pending off becomes invalid; an off may only
    /// fire if its generation is still current
    off_generation: u64,
}

impl SensorState {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_occupied(&self) -> bool {
        !self.active_players.is_empty()
    }

    #[inline]
    pub fn active_players(&self) -> usize {
        self.active_players.len()
    }

    /// Record a player starting playback (play, or resume where pause and
    /// resume are honored)
    ///
    /// Cancels any pending off-transition before mutating the set. Returns
    /// true when the set was empty before insertion, i.e. the sensor just
    /// transitioned to occupied.
    pub fn player_started(&mut self, player_id: &str) -> bool {
        self.off_generation += 1;
        let was_empty = self.active_players.is_empty();
        self.active_players.insert(player_id.to_string());
        was_empty
    }

    /// Record a player stopping playback (stop, or honored pause)
    ///
    /// Removal of an unknown player is a no-op. Returns a generation token
    /// when the set transitioned to empty: the caller must schedule a
    /// delayed off and pass the token back through [`off_due`].
    ///
    /// [`off_due`]: SensorState::off_due
    pub fn player_stopped(&mut self, player_id: &str) -> Option<u64> {
        let removed = self.active_players.remove(player_id);
        if removed && self.active_players.is_empty() {
            self.off_generation += 1;
            Some(self.off_generation)
        } else {
            debug!(
                removed = %removed,
                remaining = %self.active_players.len(),
                "player_stopped_no_off"
            );
            None
        }
    }

    /// Decide whether an elapsed off-timer may fire
    ///
    /// True only when the generation is still current and no player became
    /// active in the meantime. Firing consumes the generation so a
    /// duplicate delivery cannot fire twice.
    pub fn off_due(&mut self, generation: u64) -> bool {
        if generation != self.off_generation || self.is_occupied() {
            return false;
        }
        self.off_generation += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_start_occupies() {
        let mut state = SensorState::new();
        assert!(!state.is_occupied());
        assert!(state.player_started("abc"));
        assert!(state.is_occupied());
        assert_eq!(state.active_players(), 1);
    }

    #[test]
    fn test_repeated_start_is_idempotent() {
        let mut state = SensorState::new();
        assert!(state.player_started("abc"));
        // Same player again: no new transition, set size unchanged
        assert!(!state.player_started("abc"));
        assert_eq!(state.active_players(), 1);
    }

    #[test]
    fn test_second_player_does_not_retransition() {
        let mut state = SensorState::new();
        assert!(state.player_started("abc"));
        assert!(!state.player_started("xyz"));
        assert_eq!(state.active_players(), 2);
    }

    #[test]
    fn test_stop_of_one_of_two_players_keeps_occupied() {
        let mut state = SensorState::new();
        state.player_started("abc");
        state.player_started("xyz");

        assert!(state.player_stopped("abc").is_none());
        assert!(state.is_occupied());
    }

    #[test]
    fn test_stop_of_last_player_schedules_off() {
        let mut state = SensorState::new();
        state.player_started("abc");

        let generation = state.player_stopped("abc").expect("off should be scheduled");
        assert!(!state.is_occupied());
        assert!(state.off_due(generation));
    }

    #[test]
    fn test_off_fires_once() {
        let mut state = SensorState::new();
        state.player_started("abc");
        let generation = state.player_stopped("abc").unwrap();

        assert!(state.off_due(generation));
        assert!(!state.off_due(generation));
    }

    #[test]
    fn test_start_cancels_pending_off() {
        let mut state = SensorState::new();
        state.player_started("abc");
        let generation = state.player_stopped("abc").unwrap();

        // Play arrives before the delay elapses
        state.player_started("abc");
        assert!(!state.off_due(generation));
        assert!(state.is_occupied());
    }

    #[test]
    fn test_reoccupy_after_pending_off_reports_transition() {
        let mut state = SensorState::new();
        state.player_started("abc");
        state.player_stopped("abc").unwrap();

        // The set is empty again, so the state machine reports a fresh
        // occupied edge; the dispatcher decides whether to re-publish
        assert!(state.player_started("xyz"));
    }

    #[test]
    fn test_stop_of_unknown_player_is_noop() {
        let mut state = SensorState::new();
        state.player_started("abc");

        assert!(state.player_stopped("never-seen").is_none());
        assert!(state.is_occupied());
        assert_eq!(state.active_players(), 1);
    }

    #[test]
    fn test_stop_on_empty_set_is_noop() {
        let mut state = SensorState::new();
        assert!(state.player_stopped("abc").is_none());
        assert!(!state.is_occupied());
    }

    #[test]
    fn test_stale_generation_rejected_after_new_cycle() {
        let mut state = SensorState::new();
        state.player_started("abc");
        let first = state.player_stopped("abc").unwrap();

        state.player_started("abc");
        let second = state.player_stopped("abc").unwrap();

        assert!(!state.off_due(first));
        assert!(state.off_due(second));
    }
}
