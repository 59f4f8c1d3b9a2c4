//! Machine state owned by the orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authorization and usage phase of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No session, relay off
    #[default]
    Off,
    /// Session open, not drawing current
    Idle,
    /// Session open and drawing current
    InUse,
}

impl Phase {
    fn describe(&self) -> &'static str {
        match self {
            Phase::Off => "OFF (unauthenticated)",
            Phase::Idle => "IDLE (authenticated)",
            Phase::InUse => "IN USE (authenticated, drawing current)",
        }
    }
}

/// Snapshot of everything the orchestrator tracks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub phase: Phase,
    /// Badge of the open session, empty when off
    pub badge_id: String,
    /// Mirrors the last relay command
    pub relay_on: bool,
    pub broker_connected: bool,
    /// Last debounced current sensing level
    pub current_high: bool,
}

impl MachineState {
    /// Whether the relay and badge agree with the phase
    pub fn is_consistent(&self) -> bool {
        let session = self.phase != Phase::Off;
        self.relay_on == session && !self.badge_id.is_empty() == session
    }

    pub(crate) fn open_session(&mut self, badge_id: String) {
        self.phase = Phase::Idle;
        self.badge_id = badge_id;
        self.relay_on = true;
    }

    /// Close the session, returning the badge that held it
    pub(crate) fn close_session(&mut self) -> String {
        self.phase = Phase::Off;
        self.relay_on = false;
        std::mem::take(&mut self.badge_id)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let badge = if self.badge_id.is_empty() {
            "n/a"
        } else {
            &self.badge_id
        };
        write!(
            f,
            "state: {}, badged: {}, relay: {}, mqtt: {}",
            self.phase.describe(),
            badge,
            if self.relay_on { "on" } else { "off" },
            if self.broker_connected {
                "connected"
            } else {
                "disconnected"
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = MachineState::default();
        assert_eq!(state.phase, Phase::Off);
        assert!(state.is_consistent());
        assert_eq!(
            state.to_string(),
            "state: OFF (unauthenticated), badged: n/a, relay: off, mqtt: disconnected"
        );
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = MachineState::default();
        state.open_session("ABC".to_string());
        state.broker_connected = true;
        assert!(state.is_consistent());
        assert_eq!(
            state.to_string(),
            "state: IDLE (authenticated), badged: ABC, relay: on, mqtt: connected"
        );

        state.phase = Phase::InUse;
        assert!(state.to_string().starts_with("state: IN USE (authenticated, drawing current)"));

        assert_eq!(state.close_session(), "ABC");
        assert!(state.is_consistent());
        assert_eq!(state.phase, Phase::Off);
    }

    #[test]
    fn test_inconsistent_state_detected() {
        let state = MachineState {
            relay_on: true,
            ..Default::default()
        };
        assert!(!state.is_consistent());
    }
}
